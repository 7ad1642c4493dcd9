/// Display surface: the thumbnail grid, the folder sidebar, and the
/// visibility answers the grid gives the thumbnail pipeline
pub mod grid;
pub mod sidebar;
pub mod viewport;
