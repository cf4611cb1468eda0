// Workflow buttons (claim, verify, approve, reject).

use crate::core::applications::Decision;
use crate::core::transport::{ActionKind, WorkflowAction};
use crate::discord::events::workflow_replies::{
    application_error_text, claim_outcome_text, decided_text, verified_text,
};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    // Other components (if any) are not ours to answer.
    let Some(action) = WorkflowAction::parse(&component.data.custom_id) else {
        return Ok(());
    };

    let user_id = component.user.id.get();
    tracing::debug!(
        group_id = action.group_id,
        channel_id = action.channel_id,
        user_id,
        action = action.kind.as_str(),
        "Workflow button pressed"
    );

    let text = run_action(data, action, user_id).await;

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn run_action(data: &Data, action: WorkflowAction, user_id: u64) -> String {
    let WorkflowAction {
        kind,
        group_id,
        channel_id,
    } = action;
    let registry = &data.registry;

    let result = match kind {
        ActionKind::Claim => registry
            .claim(group_id, channel_id, user_id)
            .await
            .map(|outcome| claim_outcome_text(&outcome)),
        ActionKind::Verify => registry
            .verify(group_id, channel_id, user_id)
            .await
            .map(|app| verified_text(&app)),
        ActionKind::Approve => registry
            .decide(group_id, channel_id, Decision::Approve, user_id)
            .await
            .map(|app| decided_text(&app)),
        ActionKind::Reject => registry
            .decide(group_id, channel_id, Decision::Reject, user_id)
            .await
            .map(|app| decided_text(&app)),
    };

    result.unwrap_or_else(|err| application_error_text(&err))
}
