/// Fully connected transform and the row-vector helpers the cell is built from.
pub mod linear;

/// LSTM cell with hand-derived forward and backward passes.
pub mod lstm_cell;
