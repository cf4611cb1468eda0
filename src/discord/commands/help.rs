use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

const CATEGORY_ORDER: &[&str] = &[
    "Getting Started",
    "Applications",
    "Whitelist",
    "Administration",
];

fn category_emoji(category: &str) -> &'static str {
    match category {
        "Getting Started" => "🚀",
        "Applications" => "📝",
        "Whitelist" => "📋",
        "Administration" => "🛡️",
        _ => "•",
    }
}

struct CommandMetadata {
    category: &'static str,
    priority: i32,
    description: Option<&'static str>,
    note: Option<&'static str>,
}

fn command_metadata(name: &str) -> CommandMetadata {
    match name {
        "application" => CommandMetadata {
            category: "Getting Started",
            priority: 100,
            description: Some("See where a channel's application stands."),
            note: Some("Channels apply by posting `/apply <reason>` here."),
        },
        "stats" => CommandMetadata {
            category: "Getting Started",
            priority: 90,
            description: Some("Whitelisted channels, blocked messages and pending applications."),
            note: None,
        },
        "claim" => CommandMetadata {
            category: "Applications",
            priority: 80,
            description: Some("Claim a pending application for a channel you own."),
            note: Some("You may be asked for a reason and to confirm ownership by DM."),
        },
        "pending" => CommandMetadata {
            category: "Applications",
            priority: 70,
            description: Some("List applications waiting for review."),
            note: None,
        },
        "approve" => CommandMetadata {
            category: "Applications",
            priority: 60,
            description: Some("Approve a verified application (Admin only)."),
            note: None,
        },
        "reject" => CommandMetadata {
            category: "Applications",
            priority: 50,
            description: Some("Reject a verified application (Admin only)."),
            note: None,
        },
        "whitelist" => CommandMetadata {
            category: "Whitelist",
            priority: 60,
            description: Some("Manage which channels may post here."),
            note: Some("Subcommands: add, remove, list"),
        },
        "enable" => CommandMetadata {
            category: "Administration",
            priority: 60,
            description: Some("Start removing posts from channels that are not whitelisted (Admin only)."),
            note: None,
        },
        "disable" => CommandMetadata {
            category: "Administration",
            priority: 50,
            description: Some("Pause moderation in this conversation (Admin only)."),
            note: None,
        },
        "settings" => CommandMetadata {
            category: "Administration",
            priority: 40,
            description: Some("Show how moderation is configured here."),
            note: None,
        },
        _ => CommandMetadata {
            category: "Getting Started",
            priority: 0,
            description: None,
            note: None,
        },
    }
}

/// Show a categorized list of commands.
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let mut categories: HashMap<&str, Vec<(i32, String)>> = HashMap::new();

    for command in &ctx.framework().options().commands {
        if command.hide_in_help || command.name == "help" {
            continue;
        }

        let metadata = command_metadata(&command.name);
        let description = metadata
            .description
            .or(command.description.as_deref())
            .unwrap_or("No description provided.");

        let mut entry = format!("• **/{0}** - {1}", command.name, description);
        if let Some(note) = metadata.note {
            entry.push_str(&format!("\n  ⤷ {}", note));
        }

        categories
            .entry(metadata.category)
            .or_default()
            .push((metadata.priority, entry));
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Channel Moderation Guide")
        .description(
            "Only whitelisted channels may post here. Other channel posts are removed, \
            and the channel is told once a day how to apply.",
        )
        .color(serenity::Colour::from_rgb(88, 101, 242))
        .timestamp(serenity::Timestamp::now());

    let mut sorted_categories: Vec<_> = categories.keys().cloned().collect();
    sorted_categories.sort_by_key(|category| category_rank(category));

    for category in sorted_categories {
        if let Some(entries) = categories.get_mut(category) {
            // Priority descending, then name.
            entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let title = format!("{} {}", category_emoji(category), category);
            let formatted: Vec<String> = entries.iter().map(|(_, s)| s.clone()).collect();

            for (i, chunk) in chunk_entries(&formatted).iter().enumerate() {
                let field_name = if i == 0 {
                    title.clone()
                } else {
                    format!("{} (cont.)", title)
                };
                embed = embed.field(field_name, chunk.join("\n"), false);
            }
        }
    }

    embed = embed.footer(serenity::CreateEmbedFooter::new(
        "Need a hand? Ask a group administrator.",
    ));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn category_rank(category: &str) -> (usize, String) {
    let position = CATEGORY_ORDER
        .iter()
        .position(|&known| known == category)
        .unwrap_or(CATEGORY_ORDER.len());
    (position, category.to_string())
}

fn chunk_entries(entries: &[String]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current_chunk = Vec::new();
    let mut current_length = 0;

    for entry in entries {
        // Discord caps a field value at 1024 characters.
        if current_length + entry.len() + 1 > 1000 && !current_chunk.is_empty() {
            chunks.push(std::mem::take(&mut current_chunk));
            current_length = 0;
        }

        current_chunk.push(entry.clone());
        current_length += entry.len() + 1;
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::commands;

    #[test]
    fn test_every_command_is_described() {
        for command in commands::all() {
            if command.name == "help" {
                continue;
            }
            assert!(
                command_metadata(&command.name).description.is_some(),
                "/{} has no help entry",
                command.name
            );
        }
    }

    #[test]
    fn test_long_sections_are_split() {
        let entries: Vec<String> = (0..30).map(|i| format!("{i:>60}")).collect();
        let chunks = chunk_entries(&entries);

        assert!(chunks.len() > 1);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 30);
        for chunk in &chunks {
            assert!(chunk.join("\n").len() <= 1000);
        }
    }

    #[test]
    fn test_categories_follow_guide_order() {
        let mut categories = vec!["Administration", "Other", "Getting Started", "Whitelist"];
        categories.sort_by_key(|category| category_rank(category));
        assert_eq!(
            categories,
            vec!["Getting Started", "Whitelist", "Administration", "Other"]
        );
    }
}
