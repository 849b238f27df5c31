//! Lowering context: fresh-alias allocation, temp-table accumulation,
//! and the pointer-identity memo tables that make repeated references
//! to the same node resolve to the same frame/join instead of
//! re-lowering (and re-reifying) it.

use std::collections::HashMap;
use std::sync::Arc;

use ehrql_dialect::Dialect;
use ehrql_model::NodeRef;
use ehrql_scheduler::TempTable;

use crate::ir::Join;

pub(crate) fn ptr_key(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}

/// A row-set-shaped SQL source: a table name or parenthesized subquery,
/// with the alias its own columns are selected through.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub from_sql: String,
    pub alias: String,
}

pub(crate) struct LowerCtx<'a> {
    pub dialect: &'a dyn Dialect,
    pub joins: Vec<Join>,
    pub temp_tables: Vec<TempTable>,
    frame_memo: HashMap<usize, Frame>,
    join_memo: HashMap<usize, String>,
    counter: usize,
}

impl<'a> LowerCtx<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            joins: Vec::new(),
            temp_tables: Vec::new(),
            frame_memo: HashMap::new(),
            join_memo: HashMap::new(),
            counter: 0,
        }
    }

    pub fn fresh_alias(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{}", self.counter)
    }

    pub fn cached_frame(&self, node: &NodeRef) -> Option<Frame> {
        self.frame_memo.get(&ptr_key(node)).cloned()
    }

    pub fn cache_frame(&mut self, node: &NodeRef, frame: Frame) -> Frame {
        self.frame_memo.insert(ptr_key(node), frame.clone());
        frame
    }

    /// The join alias already registered for `node`, if this exact
    /// subgraph (by pointer identity) was already joined in.
    pub fn cached_join(&self, node: &NodeRef) -> Option<String> {
        self.join_memo.get(&ptr_key(node)).cloned()
    }

    /// Register `frame` as a `LEFT JOIN ... ON patient_id` source and
    /// remember it keyed on `node`'s identity so a second reference to
    /// the same subgraph reuses the join instead of duplicating it
    /// (spec §4.5 "Reification").
    pub fn register_join(&mut self, node: &NodeRef, frame: Frame) -> String {
        if let Some(alias) = self.cached_join(node) {
            return alias;
        }
        self.joins.push(Join { alias: frame.alias.clone(), from_sql: frame.from_sql });
        self.join_memo.insert(ptr_key(node), frame.alias.clone());
        frame.alias
    }
}
