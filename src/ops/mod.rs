pub mod flood_fill;
pub mod region_query;
pub mod segmentation;
