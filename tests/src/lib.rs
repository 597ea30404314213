//! Empty library target; this crate exists to host the end-to-end
//! scenario tests under `tests/`, which need a package to belong to.
