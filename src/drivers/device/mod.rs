mod task;

pub use task::device_control;
