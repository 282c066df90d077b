pub mod busy;
pub mod chunk;
pub mod chunks_map;
pub mod data_row;
pub mod document;
pub mod geometry;
pub mod keys;
pub mod list_renderer;
pub mod terminal;
pub mod viewport;

pub use busy::{BusyIndicator, StatusBusy};
pub use chunks_map::{ChunksMap, InitError, MapOptions, NavError, Selection};
pub use document::{Document, RowView, Surface};
pub use keys::{KeyController, NavKey};
pub use terminal::{ClientError, TerminalClient};
pub use viewport::Viewport;
