// 🔤 Code Identity - what a SWIFT/BIC code says about itself
//
// A code is an 8-character prefix (bank + country + location) plus an
// optional 3-character branch suffix. The suffix "XXX" marks the
// headquarters of every code that shares the prefix.

use std::fmt;
use thiserror::Error;

/// Suffix that marks a headquarters code
pub const HEADQUARTER_SUFFIX: &str = "XXX";

/// Length of the hierarchy grouping key
pub const PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("SWIFT code must not be empty")]
    Empty,

    #[error("SWIFT code {code} is shorter than {} characters", PREFIX_LEN)]
    TooShort { code: String },

    #[error("SWIFT code {code} contains characters other than A-Z and 0-9")]
    InvalidCharacters { code: String },
}

// ============================================================================
// CODE IDENTITY
// ============================================================================

/// Classification of a single code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeIdentity {
    pub code: String,
    pub prefix: String,
    pub is_headquarter: bool,
}

impl CodeIdentity {
    pub fn role(&self) -> CodeRole {
        if self.is_headquarter {
            CodeRole::Headquarter
        } else {
            CodeRole::Branch
        }
    }
}

impl fmt::Display for CodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} of {})", self.code, self.role(), self.prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeRole {
    Headquarter,
    Branch,
}

impl fmt::Display for CodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeRole::Headquarter => write!(f, "headquarters"),
            CodeRole::Branch => write!(f, "branch"),
        }
    }
}

/// Trim and upper-case a raw code. Everything that reaches `classify`
/// goes through here first.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// True iff the code ends with the headquarters suffix
pub fn is_headquarter_code(code: &str) -> bool {
    code.ends_with(HEADQUARTER_SUFFIX)
}

/// Classify an already-normalized code.
///
/// Codes shorter than the prefix are rejected instead of producing a
/// truncated prefix that would join unrelated hierarchies.
pub fn classify(code: &str) -> Result<CodeIdentity, CodeError> {
    if code.is_empty() {
        return Err(CodeError::Empty);
    }

    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(CodeError::InvalidCharacters {
            code: code.to_string(),
        });
    }

    if code.len() < PREFIX_LEN {
        return Err(CodeError::TooShort {
            code: code.to_string(),
        });
    }

    Ok(CodeIdentity {
        code: code.to_string(),
        prefix: code[..PREFIX_LEN].to_string(),
        is_headquarter: is_headquarter_code(code),
    })
}
