//! The `Code` family: regex-validated clinical coding system values,
//! each with its own trim-and-validate constructor and validation regex.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Result, TypesError};

/// The coding system a [`Code`] value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSystem {
    /// Read/CTV3.
    Ctv3,
    /// SNOMED CT.
    SnomedCt,
    /// ICD-10.
    Icd10,
    /// OPCS-4 procedure codes.
    Opcs4,
    /// British National Formulary.
    Bnf,
    /// Dictionary of Medicines and Devices.
    Dmd,
}

impl CodeSystem {
    /// Canonical name used in error messages and serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ctv3 => "ctv3",
            Self::SnomedCt => "snomed_ct",
            Self::Icd10 => "icd10",
            Self::Opcs4 => "opcs4",
            Self::Bnf => "bnf",
            Self::Dmd => "dmd",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            // Read codes: 5 alphanumeric characters.
            Self::Ctv3 => r"^[A-Za-z0-9.]{1,5}$",
            // SNOMED CT: 6-18 digit numeric identifier.
            Self::SnomedCt => r"^[0-9]{6,18}$",
            // ICD-10: letter, two digits, optional subdivision.
            Self::Icd10 => r"^[A-Za-z][0-9]{2}(\.?[0-9A-Za-z]{1,4})?$",
            // OPCS-4: letter, two digits, dot, one or two digits.
            Self::Opcs4 => r"^[A-Za-z][0-9]{2}\.[0-9]{1,2}$",
            // BNF: hierarchical numeric/alpha paragraph code.
            Self::Bnf => r"^[0-9A-Za-z]{2,15}$",
            // dm+d: numeric SNOMED-derived identifier.
            Self::Dmd => r"^[0-9]{6,18}$",
        }
    }

    fn regex(&self) -> &'static Regex {
        static CACHES: [OnceLock<Regex>; 6] = [
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
        ];
        let index = match self {
            Self::Ctv3 => 0,
            Self::SnomedCt => 1,
            Self::Icd10 => 2,
            Self::Opcs4 => 3,
            Self::Bnf => 4,
            Self::Dmd => 5,
        };
        CACHES[index].get_or_init(|| Regex::new(self.pattern()).expect("static regex compiles"))
    }
}

impl fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validated clinical code value.
///
/// Construction is the only way to obtain a `Code`, and it always validates
/// against the code system's regex, so a `Code` in hand is always
/// well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Code {
    system: CodeSystem,
    value: String,
}

impl Code {
    /// Validate and construct a code value.
    pub fn new(system: CodeSystem, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !system.regex().is_match(&value) {
            return Err(TypesError::InvalidCode {
                system: system.as_str(),
                value,
            });
        }
        Ok(Self { system, value })
    }

    /// The coding system this value belongs to.
    pub fn system(&self) -> CodeSystem {
        self.system
    }

    /// The validated raw code text.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snomed_requires_numeric() {
        assert!(Code::new(CodeSystem::SnomedCt, "123456").is_ok());
        assert!(Code::new(CodeSystem::SnomedCt, "abc123").is_err());
    }

    #[test]
    fn icd10_accepts_subdivision() {
        assert!(Code::new(CodeSystem::Icd10, "E11.9").is_ok());
        assert!(Code::new(CodeSystem::Icd10, "E11").is_ok());
        assert!(Code::new(CodeSystem::Icd10, "11.9").is_err());
    }

    #[test]
    fn a_code_in_hand_is_well_formed() {
        let err = Code::new(CodeSystem::Opcs4, "nope").unwrap_err();
        assert!(matches!(err, TypesError::InvalidCode { .. }));
    }
}
