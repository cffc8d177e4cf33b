pub mod board;
pub mod compound;
pub mod game;
pub mod movegen;
pub mod piece;
pub mod setup;
pub mod terrain;
