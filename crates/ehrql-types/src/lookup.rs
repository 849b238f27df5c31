//! Case-insensitive name lookup, used wherever column or table names from a
//! schema must be matched against user-supplied or backend-supplied names.

use std::collections::HashMap;

/// A set that performs case-insensitive lookups while preserving original
/// case.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveSet {
    map: HashMap<String, String>,
}

impl CaseInsensitiveSet {
    /// Build a set from an iterator of names. The first occurrence of each
    /// name (case-insensitively) is preserved.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for name in names {
            let name = name.as_ref();
            map.entry(name.to_ascii_uppercase())
                .or_insert_with(|| name.to_string());
        }
        Self { map }
    }

    /// Get the original-cased name for a case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_uppercase()).map(String::as_str)
    }

    /// Whether `name` is present, case-insensitively.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_original_case_on_lookup() {
        let set = CaseInsensitiveSet::new(["PatientId", "DOB"]);
        assert_eq!(set.get("patientid"), Some("PatientId"));
        assert!(set.contains("dob"));
        assert!(!set.contains("missing"));
    }
}
