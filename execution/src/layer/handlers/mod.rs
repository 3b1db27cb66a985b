mod game;
mod system;
