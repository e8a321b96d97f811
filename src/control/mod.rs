// Control primitives: closed-loop building blocks and operator input shaping.

pub mod input;
pub mod pid;

pub use input::InputShaper;
pub use pid::{Feedforward, Pid, PidGains, ProfileState, TrapezoidProfile};
