//! Ground-truth capture: the serialized scene graph, its flattened table form, and the on-disk
//! pair of surface image and sidecar.

mod float;
pub mod sidecar;
mod store;
pub mod table;

pub use sidecar::{deserialize, serialize, CaptureDocument, Contour};
pub use store::{CaptureRecord, CaptureStore};
pub use table::{extract, NodeRecord, NodeTable, COLUMNS};
