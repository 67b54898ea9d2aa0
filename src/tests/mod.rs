//! Integration-style tests for the binary: full refresh cycles against a scripted
//! service, plus the summary formatting used by the polling loop.
