pub mod dispatch;
pub mod reconciler;
pub mod simulation;
pub mod simulator;
