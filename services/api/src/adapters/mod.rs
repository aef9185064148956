pub mod db;
pub mod rasterizer;

pub use db::DbAdapter;
pub use rasterizer::PdftoppmRasterizer;
