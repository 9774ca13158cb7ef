//! Tests for the data region and the storage façade
