pub mod market_gate;
