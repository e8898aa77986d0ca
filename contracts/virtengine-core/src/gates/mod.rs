pub mod audit;
pub mod cert;
pub mod provider;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A signed key/value pair describing a provider capability.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// True when every attribute in `required` appears in `held` with an equal
/// value.
pub fn attributes_satisfied(required: &[Attribute], held: &[Attribute]) -> bool {
    required.iter().all(|req| {
        held.iter()
            .any(|have| have.key == req.key && have.value == req.value)
    })
}
