use std::sync::Arc;

use teloxide::requests::Requester;
use teloxide::types::ChatId;
use teloxide::Bot;
use tracing::{info, warn};

use crate::config::Config;
use crate::utils;

/// Outbound event fired after a successful reclaim mutation.
#[derive(Debug, Clone)]
pub struct ReclaimCompleted {
    pub lamports_recovered: u64,
    pub account_count: usize,
    pub signature: String,
}

/// Fire-and-forget notification sink. Delivery runs on a spawned task
/// and failures are swallowed; the reclaim path never blocks on chat.
pub struct Notifier {
    bot: Bot,
    chat_ids: Vec<i64>,
}

impl Notifier {
    pub fn from_config(config: &Config) -> Option<Arc<Self>> {
        let telegram = config.telegram.as_ref()?;
        if !telegram.notifications_enabled || telegram.chat_ids.is_empty() {
            info!("telegram notifications disabled");
            return None;
        }

        info!("notifier initialized for {} chats", telegram.chat_ids.len());
        Some(Arc::new(Self {
            bot: Bot::new(telegram.bot_token.clone()),
            chat_ids: telegram.chat_ids.clone(),
        }))
    }

    pub fn reclaim_completed(self: &Arc<Self>, event: ReclaimCompleted) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let message = format!(
                "Reclaimed {} from {} account(s)\ntx: {}",
                utils::format_sol(event.lamports_recovered),
                event.account_count,
                event.signature,
            );
            notifier.send_to_all(&message).await;
        });
    }

    async fn send_to_all(&self, text: &str) {
        for chat_id in &self.chat_ids {
            if let Err(e) = self.bot.send_message(ChatId(*chat_id), text).await {
                warn!("failed to deliver notification to {}: {}", chat_id, e);
            }
        }
    }
}
