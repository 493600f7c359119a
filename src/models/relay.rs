use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{RelayError, RelayResult};

pub const MISSING_PROMPT_MESSAGE: &str = "No prompt was provided.";

#[derive(Debug, Deserialize, Validate)]
pub struct CurriculumRequest {
    #[validate(required, length(min = 1))]
    pub prompt: Option<String>,
}

impl CurriculumRequest {
    /// Parses a raw request body and returns the validated prompt.
    pub fn parse_prompt(body: &[u8]) -> RelayResult<String> {
        let req: CurriculumRequest = serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidInput(format!("Invalid request body: {}", e)))?;

        if req.validate().is_err() {
            return Err(RelayError::InvalidInput(MISSING_PROMPT_MESSAGE.to_string()));
        }

        req.prompt
            .ok_or_else(|| RelayError::InvalidInput(MISSING_PROMPT_MESSAGE.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CurriculumResponse {
    pub curriculum: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
