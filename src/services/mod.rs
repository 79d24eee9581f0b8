// Cart, catalog, checkout and order recording
pub mod commerce;

// Hosted payment provider client
pub mod payments;
