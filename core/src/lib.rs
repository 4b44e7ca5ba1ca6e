pub mod aggregate;
pub mod db;
pub mod error;
pub mod estimate;
pub mod form;
pub mod ledger;
pub mod models;
pub mod mods;
pub mod openfoodfacts;
pub mod portion;
pub mod service;

pub use error::{EngineError, ErrorReport, Result};
pub use service::PlateService;
