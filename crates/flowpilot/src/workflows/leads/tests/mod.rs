mod common;
mod dispatch;
mod intake;
