//! Integration tests for freestrm-drive
//!
//! Uses wiremock to simulate the 115 web API and an OpenList server, and
//! verifies the clients end to end: caching, paging, block detection,
//! encrypted link resolution, export jobs and token handling.

mod common;

mod test_openlist;
mod test_pan115;
