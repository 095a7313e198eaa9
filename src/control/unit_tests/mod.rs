#[cfg(test)]
mod mcp_tests;
