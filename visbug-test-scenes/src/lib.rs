pub mod expectations;
pub mod host;
pub mod page;
pub mod scene;
pub mod shaders;
pub mod soft_gpu;

pub use expectations::{count_differences, pixel_mismatches, ExpectedPixel};
pub use host::{SoftHost, BACKGROUND, BATCH_UNIFORMS};
pub use page::HeadlessPage;
pub use scene::{
    bar_with_neighbour_scene, build_main_scene, find, single_bar_scene, CANVAS_HEIGHT,
    CANVAS_WIDTH, MAIN_SCENE_SELECTION,
};
pub use shaders::{descriptor, full_catalog, BROKEN_FRAGMENT};
pub use soft_gpu::{ProgramEffect, SoftGpu};
