//! External service integrations.

pub mod places {
    pub use crate::places::*;
}

pub mod llm {
    pub use crate::llm::*;
}
