//! モデル定義
//!
//! gantry が扱うリソース記述子のデータモデルを定義します。

mod descriptor;
mod kind;
mod spec;

// Re-exports
pub use descriptor::*;
pub use kind::*;
pub use spec::*;
