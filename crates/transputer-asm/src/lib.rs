pub mod analyze;
pub mod model;

pub use analyze::{analyze, edges, render_report, Block, Edge, EdgeKind, EdgeOut, FunctionOut, Report};
pub use model::{listing, load_source, render_listing, ListingRow};
