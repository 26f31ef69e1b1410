pub mod autopark_env;
