//! Messages exchanged with the model-hosting process.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Function codes understood by the model host binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ModelFunction {
    /// Load the model from a data directory. Sent once per process.
    Config = 1,
    /// Count the tokens of a prompt.
    TokenCount = 2,
    /// Generate text continuing a prompt.
    Generate = 3,
}

impl ModelFunction {
    /// Numeric code as written on the wire.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Config),
            2 => Some(Self::TokenCount),
            3 => Some(Self::Generate),
            _ => None,
        }
    }
}

/// A request message with a statically known function and response type.
pub trait ModelRequest: Serialize + Send + Sync {
    const FUNCTION: ModelFunction;
    type Response: ModelResponse;
}

/// A response message. Every response may carry a model-level error.
pub trait ModelResponse: DeserializeOwned + Default + Send {
    /// The model-reported error, if the error field is non-empty.
    fn error(&self) -> Option<&str>;
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRequest {
    pub model_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigResponse {
    #[serde(skip_serializing_if = "is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCountRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCountResponse {
    pub token_count: i32,
    #[serde(skip_serializing_if = "is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateResponse {
    pub generated: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub error: String,
}

macro_rules! model_response {
    ($($ty:ty),*) => {
        $(impl ModelResponse for $ty {
            fn error(&self) -> Option<&str> {
                (!self.error.is_empty()).then_some(self.error.as_str())
            }
        })*
    };
}

model_response!(ConfigResponse, TokenCountResponse, GenerateResponse);

impl ModelRequest for ConfigRequest {
    const FUNCTION: ModelFunction = ModelFunction::Config;
    type Response = ConfigResponse;
}

impl ModelRequest for TokenCountRequest {
    const FUNCTION: ModelFunction = ModelFunction::TokenCount;
    type Response = TokenCountResponse;
}

impl ModelRequest for GenerateRequest {
    const FUNCTION: ModelFunction = ModelFunction::Generate;
    type Response = GenerateResponse;
}
