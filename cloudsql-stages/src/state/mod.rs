//! Test run state.
//!
//! - Named values persisted per working directory (`save_*` / `load_*`)
//! - Isolated copies of the module tree for parallel scenarios

mod store;
mod workspace;

pub use store::{
    clean_up_saved, is_saved, load_options, load_string, load_value, save_options, save_string,
    save_value, value_path, TEST_DATA_DIR,
};
pub use workspace::{copy_module_to_temp, ModuleCopy};
