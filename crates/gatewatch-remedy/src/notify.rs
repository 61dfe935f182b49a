//! Outbound pages.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use gatewatch_core::template;

use crate::command::CommandRunner;
use crate::error::{CommandError, CommandResult};

/// Subject prefix on every page.
pub const DAEMON_NAME: &str = "gatewatch";

/// Delivers a page to an operator.
#[async_trait]
pub trait Pager: Send + Sync {
    async fn page(&self, message: &str, body: &str) -> CommandResult<()>;
}

/// Sends pages through a `mail`-style command with the body on stdin.
pub struct MailPager {
    runner: Arc<dyn CommandRunner>,
    template: String,
    from: String,
    to: String,
}

impl MailPager {
    pub fn new(runner: Arc<dyn CommandRunner>, template: &str, from: &str, to: &str) -> Self {
        Self {
            runner,
            template: template.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[async_trait]
impl Pager for MailPager {
    async fn page(&self, message: &str, body: &str) -> CommandResult<()> {
        let subject = format!("{DAEMON_NAME}: {message}");
        let argv = template::render(
            &self.template,
            &[("subject", &subject), ("from", &self.from), ("to", &self.to)],
        );
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| CommandError::Empty(self.template.clone()))?;
        self.runner.run(&argv, Some(body)).await?.check(&program)?;
        debug!(to = %self.to, %subject, "page sent");
        Ok(())
    }
}

/// Used when no page destination is configured: pages only reach the log.
pub struct LogPager;

#[async_trait]
impl Pager for LogPager {
    async fn page(&self, message: &str, _body: &str) -> CommandResult<()> {
        info!(page = true, "{DAEMON_NAME}: {message}");
        Ok(())
    }
}
