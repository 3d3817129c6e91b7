pub mod candle;
pub mod db_connect;
pub mod logging;
