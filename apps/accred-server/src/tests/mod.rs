//! Server test suite: shared helpers plus handler tests by domain.

mod handlers;
