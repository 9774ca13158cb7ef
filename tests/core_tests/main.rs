//! Tests for the value types shared by every layer

mod address_tests;
mod index_tests;
