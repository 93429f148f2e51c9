//! Plot phase: parse a request, assemble its data from the saved analysis,
//! draw it and export it.
pub mod chart;
pub mod dispatch;
pub mod render;
pub mod request;

pub use chart::Chart;
pub use dispatch::{dispatch, PlotContext};
pub use render::{ImageFormat, PlottersRenderer, Renderer};
pub use request::{PlotKind, PlotRequest, SetSource, StatColumn};
