//! Local input validation and session-code generation

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SessionCode;

pub const MAX_NICKNAME_LEN: usize = 20;
pub const CODE_LENGTH: usize = 4;

/// Unambiguous alphabet: no `I`, `O`, `0` or `1`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Rejected locally before anything touches the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("nickname must be 20 characters or less (got {0})")]
    NicknameTooLong(usize),
    #[error("session code must not be empty")]
    EmptyCode,
    #[error("question {question_id} has {found} options")]
    OptionCount { question_id: String, found: usize },
    #[error("question {question_id} marks option {index} as correct, which does not exist")]
    CorrectAnswerOutOfRange { question_id: String, index: usize },
}

/// Why acknowledge-join turned a player away.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    #[error("game not found")]
    NotFound,
    #[error("game has already started or ended")]
    AlreadyStarted,
    #[error("nickname already taken")]
    NicknameTaken,
    #[error("invalid join request: {0}")]
    Invalid(String),
}

/// Trims and length-checks a nickname, counting characters rather than bytes.
pub fn validate_nickname(nickname: &str) -> Result<String, ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyNickname);
    }
    let len = trimmed.chars().count();
    if len > MAX_NICKNAME_LEN {
        return Err(ValidationError::NicknameTooLong(len));
    }
    Ok(trimmed.to_string())
}

/// Trims and upper-cases a user-typed code.
pub fn normalize_code(code: &str) -> Result<SessionCode, ValidationError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    Ok(trimmed.to_uppercase())
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> SessionCode {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_nickname_trimmed() {
        assert_eq!(validate_nickname("  Ana ").unwrap(), "Ana");
    }

    #[test]
    fn test_nickname_empty() {
        assert_eq!(validate_nickname("   "), Err(ValidationError::EmptyNickname));
    }

    #[test]
    fn test_nickname_length_limit() {
        let twenty = "a".repeat(20);
        assert!(validate_nickname(&twenty).is_ok());

        let twenty_one = "a".repeat(21);
        assert_eq!(
            validate_nickname(&twenty_one),
            Err(ValidationError::NicknameTooLong(21))
        );
    }

    #[test]
    fn test_nickname_counts_chars_not_bytes() {
        let accented = "é".repeat(20);
        assert!(validate_nickname(&accented).is_ok());
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(normalize_code(" wxyz ").unwrap(), "WXYZ");
        assert_eq!(normalize_code(""), Err(ValidationError::EmptyCode));
    }

    #[test]
    fn test_generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}
