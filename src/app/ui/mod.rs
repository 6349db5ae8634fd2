mod controls;
mod details;
mod fps;
mod panels;

pub(super) use fps::FrameStats;
pub(super) use panels::{draw_ready, draw_shell};
