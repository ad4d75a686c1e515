use crate::pager::{Direction, PageView};
use crate::presenter::{Navigation, Refusal, ReplyChannel, ReplyError};
use anyhow::Result;
use serenity::all::{
    ButtonStyle, CommandInteraction, ComponentInteraction, Context, CreateActionRow, CreateButton,
    CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, EditMessage, Message, Reaction, ReactionType,
};
use serenity::async_trait;
use serenity::futures::stream::BoxStream;
use serenity::futures::StreamExt;
use serenity::http::HttpError;

pub const PREV_ID: &str = "prev";
pub const NEXT_ID: &str = "next";

const PREV_EMOJI: &str = "⬅️";
const NEXT_EMOJI: &str = "➡️";

/// Unknown Message / Unknown Channel
const GONE_CODES: [isize; 2] = [10008, 10003];

/// Turns a page into the embed a command wants to show.
pub type Render = Box<dyn Fn(&PageView) -> CreateEmbed + Send + Sync>;

/// Prev/next buttons with the edge buttons disabled.
pub fn nav_buttons(view: &PageView) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(PREV_ID)
            .label("◀️")
            .style(ButtonStyle::Primary)
            .disabled(!view.can_go_prev),
        CreateButton::new(NEXT_ID)
            .label("▶️")
            .style(ButtonStyle::Primary)
            .disabled(!view.can_go_next),
    ])
}

fn button_direction(custom_id: &str) -> Option<Direction> {
    match custom_id {
        PREV_ID => Some(Direction::Prev),
        NEXT_ID => Some(Direction::Next),
        _ => None,
    }
}

fn reaction_direction(emoji: &ReactionType) -> Option<Direction> {
    match emoji {
        ReactionType::Unicode(name) if name == PREV_EMOJI => Some(Direction::Prev),
        ReactionType::Unicode(name) if name == NEXT_EMOJI => Some(Direction::Next),
        _ => None,
    }
}

fn is_gone_code(code: isize) -> bool {
    GONE_CODES.contains(&code)
}

/// Separate a deleted message from every other Discord failure.
fn classify(err: serenity::Error) -> ReplyError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        if is_gone_code(response.error.code) {
            return ReplyError::MessageGone;
        }
    }
    ReplyError::Transport(err.into())
}

/// Paginates through a follow-up message carrying ◀️/▶️ buttons.
pub struct ButtonReply {
    ctx: Context,
    command: CommandInteraction,
    render: Render,
    interactions: Option<BoxStream<'static, ComponentInteraction>>,
}

impl ButtonReply {
    pub fn new(ctx: Context, command: CommandInteraction, render: Render) -> Self {
        Self {
            ctx,
            command,
            render,
            interactions: None,
        }
    }
}

#[async_trait]
impl ReplyChannel for ButtonReply {
    type Handle = Message;
    type Ack = ComponentInteraction;

    async fn send_initial(&mut self, view: &PageView) -> Result<Message> {
        let mut followup = CreateInteractionResponseFollowup::new().embed((self.render)(view));
        if view.has_controls() {
            followup = followup.components(vec![nav_buttons(view)]);
        }

        let message = self.command.create_followup(&self.ctx.http, followup).await?;

        if view.has_controls() {
            self.interactions = Some(
                message
                    .await_component_interactions(&self.ctx.shard)
                    .stream()
                    .boxed(),
            );
        }

        Ok(message)
    }

    async fn next_navigation(&mut self, _handle: &Message) -> Option<Navigation<ComponentInteraction>> {
        let interactions = self.interactions.as_mut()?;

        loop {
            let interaction = interactions.next().await?;
            match button_direction(&interaction.data.custom_id) {
                Some(direction) => {
                    return Some(Navigation {
                        requester: interaction.user.id.get(),
                        direction,
                        ack: interaction,
                    })
                }
                None => {
                    tracing::debug!("Ignoring unknown component {}", interaction.data.custom_id);
                }
            }
        }
    }

    async fn update_message(
        &mut self,
        _handle: &Message,
        ack: ComponentInteraction,
        view: &PageView,
    ) -> Result<(), ReplyError> {
        let response = CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .embed((self.render)(view))
                .components(vec![nav_buttons(view)]),
        );

        ack.create_response(&self.ctx.http, response)
            .await
            .map_err(classify)
    }

    async fn refuse(&mut self, ack: ComponentInteraction, refusal: Refusal) -> Result<()> {
        let response = match refusal {
            Refusal::NotOwner => CreateInteractionResponse::Acknowledge,
            Refusal::Expired => CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("This interaction has expired. Run the command again.")
                    .ephemeral(true),
            ),
        };

        ack.create_response(&self.ctx.http, response).await?;
        Ok(())
    }

    async fn strip_controls(&mut self, handle: &Message) -> Result<()> {
        self.interactions = None;
        handle
            .channel_id
            .edit_message(&self.ctx.http, handle.id, EditMessage::new().components(vec![]))
            .await?;
        Ok(())
    }
}

/// Paginates through a follow-up message navigated with ⬅️/➡️ reactions.
pub struct ReactionReply {
    ctx: Context,
    command: CommandInteraction,
    render: Render,
    reactions: Option<BoxStream<'static, Reaction>>,
}

impl ReactionReply {
    pub fn new(ctx: Context, command: CommandInteraction, render: Render) -> Self {
        Self {
            ctx,
            command,
            render,
            reactions: None,
        }
    }
}

#[async_trait]
impl ReplyChannel for ReactionReply {
    type Handle = Message;
    type Ack = Reaction;

    async fn send_initial(&mut self, view: &PageView) -> Result<Message> {
        let followup = CreateInteractionResponseFollowup::new().embed((self.render)(view));
        let message = self.command.create_followup(&self.ctx.http, followup).await?;

        if view.has_controls() {
            // Collect before reacting so an early click is not lost.
            self.reactions = Some(message.await_reactions(&self.ctx.shard).stream().boxed());

            message
                .react(&self.ctx, ReactionType::Unicode(PREV_EMOJI.to_string()))
                .await?;
            message
                .react(&self.ctx, ReactionType::Unicode(NEXT_EMOJI.to_string()))
                .await?;
        }

        Ok(message)
    }

    async fn next_navigation(&mut self, handle: &Message) -> Option<Navigation<Reaction>> {
        let reactions = self.reactions.as_mut()?;

        loop {
            let reaction = reactions.next().await?;

            // Our own ⬅️/➡️ come through the collector too.
            let Some(user_id) = reaction.user_id else {
                continue;
            };
            if user_id == handle.author.id {
                continue;
            }

            if let Some(direction) = reaction_direction(&reaction.emoji) {
                return Some(Navigation {
                    requester: user_id.get(),
                    direction,
                    ack: reaction,
                });
            }
        }
    }

    async fn update_message(
        &mut self,
        handle: &Message,
        ack: Reaction,
        view: &PageView,
    ) -> Result<(), ReplyError> {
        handle
            .channel_id
            .edit_message(
                &self.ctx.http,
                handle.id,
                EditMessage::new().embed((self.render)(view)),
            )
            .await
            .map_err(classify)?;

        if let Err(e) = ack.delete(&self.ctx.http).await {
            tracing::debug!("Failed to remove navigation reaction: {}", e);
        }
        Ok(())
    }

    async fn refuse(&mut self, _ack: Reaction, _refusal: Refusal) -> Result<()> {
        Ok(())
    }

    async fn strip_controls(&mut self, handle: &Message) -> Result<()> {
        self.reactions = None;
        handle.delete_reactions(&self.ctx.http).await?;
        Ok(())
    }
}
