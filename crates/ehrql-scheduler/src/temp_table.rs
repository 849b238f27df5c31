//! A generated temporary table and the queries that create/tear it down
//! (spec §4.7).

/// A temporary table materialized during lowering, carrying its own
/// setup (CREATE + populate + index) and cleanup (DROP IF EXISTS) query
/// lists, plus the names of other temp tables its setup queries
/// reference.
#[derive(Debug, Clone, Default)]
pub struct TempTable {
    pub name: String,
    pub setup_queries: Vec<String>,
    pub cleanup_queries: Vec<String>,
    pub depends_on: Vec<String>,
}

impl TempTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_setup(mut self, query: impl Into<String>) -> Self {
        self.setup_queries.push(query.into());
        self
    }

    pub fn with_cleanup(mut self, query: impl Into<String>) -> Self {
        self.cleanup_queries.push(query.into());
        self
    }

    pub fn depends_on(mut self, table_name: impl Into<String>) -> Self {
        self.depends_on.push(table_name.into());
        self
    }
}
