// SPDX-License-Identifier: MIT

//! Node runtime configuration (§6 "Configuration options").

use meshnode_core::Alias;
use meshnode_mailbox::DEFAULT_MAX_SIZE;
use meshnode_pmd::env::DEFAULT_PORT;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub alias: Option<Alias>,
    pub pmd_host: String,
    pub pmd_port: u16,
    pub mailbox_max_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            alias: None,
            pmd_host: "localhost".to_string(),
            pmd_port: DEFAULT_PORT,
            mailbox_max_size: DEFAULT_MAX_SIZE,
        }
    }
}
