pub mod history;
pub mod mask;
pub mod spatial_index;
pub mod stroke;
