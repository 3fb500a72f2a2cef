// Domain-layer modules and shared errors/models
pub mod crawler {
    pub use crate::crawler::*;
}

pub mod features {
    pub use crate::features::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
