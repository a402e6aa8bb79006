//! Interactive routine picker, shown by `run routine` without arguments.

mod app;
mod input;
mod picker;
mod ui;

pub use app::pick_routine;
pub use input::{handle_key, PickerAction};
pub use picker::RoutinePicker;
pub use ui::draw;
