// Discord implementation of the messaging transport.
//
// Groups are guild text channels; users are reached by DM. Workflow buttons
// carry their WorkflowAction in the component custom_id so the interaction
// handler can route them back to the registry.

use crate::core::transport::{ActionButton, ActionKind, MessagingTransport, Target, TransportError};
use ::serenity::http::HttpError;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct DiscordTransport {
    http: Arc<serenity::Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn guild_of(&self, group_id: u64) -> Result<serenity::GuildId, TransportError> {
        let channel = self
            .http
            .get_channel(serenity::ChannelId::new(group_id))
            .await
            .map_err(classify)?;

        channel
            .guild()
            .map(|c| c.guild_id)
            .ok_or_else(|| TransportError::Other(format!("Channel {group_id} is not in a guild")))
    }
}

/// Map a serenity failure onto the transport's retry classes.
fn classify(err: serenity::Error) -> TransportError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        match response.status_code.as_u16() {
            429 => return TransportError::RateLimited { retry_after: None },
            404 => return TransportError::NotFound,
            403 => return TransportError::Forbidden,
            _ => {}
        }
    }
    TransportError::Other(err.to_string())
}

fn button_style(kind: ActionKind) -> serenity::ButtonStyle {
    match kind {
        ActionKind::Approve => serenity::ButtonStyle::Success,
        ActionKind::Reject => serenity::ButtonStyle::Danger,
        ActionKind::Claim | ActionKind::Verify => serenity::ButtonStyle::Primary,
    }
}

fn action_rows(actions: &[ActionButton]) -> Vec<serenity::CreateActionRow> {
    if actions.is_empty() {
        return Vec::new();
    }

    // Discord allows five buttons per row.
    actions
        .chunks(5)
        .map(|chunk| {
            let buttons = chunk
                .iter()
                .map(|button| {
                    serenity::CreateButton::new(button.action.to_string())
                        .label(&button.label)
                        .style(button_style(button.action.kind))
                })
                .collect();
            serenity::CreateActionRow::Buttons(buttons)
        })
        .collect()
}

fn grants_management(permissions: serenity::Permissions) -> bool {
    permissions.contains(serenity::Permissions::ADMINISTRATOR)
        || permissions.contains(serenity::Permissions::MANAGE_GUILD)
}

#[async_trait]
impl MessagingTransport for DiscordTransport {
    async fn send(
        &self,
        target: Target,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<(), TransportError> {
        let channel_id = match target {
            Target::Group(group_id) => serenity::ChannelId::new(group_id),
            Target::User(user_id) => {
                serenity::UserId::new(user_id)
                    .create_dm_channel(&*self.http)
                    .await
                    .map_err(classify)?
                    .id
            }
        };

        let message = serenity::CreateMessage::new()
            .content(text)
            .components(action_rows(actions));

        channel_id
            .send_message(&*self.http, message)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete(&self, group_id: u64, message_id: u64) -> Result<(), TransportError> {
        self.http
            .delete_message(
                serenity::ChannelId::new(group_id),
                serenity::MessageId::new(message_id),
                Some("Channel is not whitelisted"),
            )
            .await
            .map_err(classify)
    }

    async fn is_administrator(&self, group_id: u64, user_id: u64) -> Result<bool, TransportError> {
        let guild_id = self.guild_of(group_id).await?;
        let guild = self.http.get_guild(guild_id).await.map_err(classify)?;

        if guild.owner_id.get() == user_id {
            return Ok(true);
        }

        let member = self
            .http
            .get_member(guild_id, serenity::UserId::new(user_id))
            .await
            .map_err(classify)?;

        let everyone = guild_id.everyone_role();
        let allowed = guild
            .roles
            .iter()
            .filter(|(role_id, _)| **role_id == everyone || member.roles.contains(*role_id))
            .any(|(_, role)| grants_management(role.permissions));

        Ok(allowed)
    }

    async fn group_administrators(&self, group_id: u64) -> Result<Vec<u64>, TransportError> {
        let guild_id = self.guild_of(group_id).await?;
        let guild = self.http.get_guild(guild_id).await.map_err(classify)?;
        Ok(vec![guild.owner_id.get()])
    }
}
