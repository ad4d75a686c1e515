use crate::config::PaginationConfig;
use crate::gemini::GeminiClient;
use crate::pager::{PageView, SessionOptions, Wraparound};
use crate::presenter::{present, ReplyChannel};
use crate::reply::{ButtonReply, ReactionReply, Render};
use crate::state::BotRuntimeState;
use anyhow::{Context as _, Result};
use regex::Regex;
use serenity::all::{
    Attachment, Command, CommandDataOption, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, EditInteractionResponse, Timestamp,
};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

const BLUE: u32 = 0x0092e0;
const GREEN: u32 = 0x00ff00;
const YELLOW: u32 = 0xffff00;
const GOLD: u32 = 0xffd700;
const RED: u32 = 0xff0000;

/// Help is short, so it gets smaller pages to stay navigable.
const HELP_PAGE_SIZE: usize = 400;
const MAX_ATTACHMENT_BYTES: u32 = 256 * 1024;

const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

const LOCKED_MESSAGE: &str = "Commands are currently locked. Only the bot owner can use commands.";
const NO_PERMISSION_MESSAGE: &str = "You do not have permission to use this command.";
const ERROR_MESSAGE: &str = "There was an error executing that command!";

pub struct CommandInfo {
    pub name: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "createcontent",
        description: "Generate content using AI with a specified content type.",
    },
    CommandInfo {
        name: "snippet",
        description: "Generate a code snippet using AI.",
    },
    CommandInfo {
        name: "debug",
        description: "Get help with debugging your code.",
    },
    CommandInfo {
        name: "document",
        description: "Generate documentation for your code or ask a question about it.",
    },
    CommandInfo {
        name: "imagine",
        description: "Generate any code for any language or purpose.",
    },
    CommandInfo {
        name: "help",
        description: "Provides a list of available commands",
    },
    CommandInfo {
        name: "ping",
        description: "Replies with Pong!",
    },
    CommandInfo {
        name: "lock",
        description: "Locks all other commands. Only available to the bot owner.",
    },
    CommandInfo {
        name: "reload-commands",
        description: "Reloads all bot commands. Only available to the bot owner.",
    },
];

fn info(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|command| command.name == name)
}

fn command(name: &str) -> CreateCommand {
    let description = info(name).map_or("", |info| info.description);
    debug_assert!(!description.is_empty(), "/{} is missing from COMMANDS", name);
    CreateCommand::new(name).description(description)
}

fn string_arg(name: &str, description: &str, required: bool) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, name, description).required(required)
}

/// Every slash command the bot registers.
pub fn definitions() -> Vec<CreateCommand> {
    vec![
        command("createcontent")
            .add_option(string_arg(
                "description",
                "Description of the content to generate",
                true,
            ))
            .add_option(
                string_arg("content_type", "Type of content to generate", false)
                    .add_string_choice("Code Snippet", "code")
                    .add_string_choice("Story", "story")
                    .add_string_choice("Explanation", "explanation"),
            ),
        command("snippet")
            .add_option(
                string_arg("language", "The language for the snippet", true)
                    .add_string_choice("Lua", "lua")
                    .add_string_choice("Python", "python")
                    .add_string_choice("JavaScript", "javascript")
                    .add_string_choice("Rust", "rust")
                    .add_string_choice("Java", "java"),
            )
            .add_option(string_arg(
                "description",
                "Description of the snippet (e.g., \"Debounce a function call\")",
                true,
            )),
        command("debug")
            .add_option(
                string_arg("language", "The programming language of your code", true)
                    .add_string_choice("Java", "java")
                    .add_string_choice("JavaScript", "javascript")
                    .add_string_choice("Python", "python"),
            )
            .add_option(string_arg("code", "The code you need help with", false))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Attachment,
                "file",
                "Upload a file containing your code",
            )),
        command("document")
            .add_option(string_arg(
                "function",
                "The function or code to document or ask about",
                true,
            ))
            .add_option(
                string_arg(
                    "type",
                    "Choose whether to generate documentation or ask a question",
                    true,
                )
                .add_string_choice("Documentation", "documentation")
                .add_string_choice("Question", "question"),
            ),
        command("imagine")
            .add_option(string_arg(
                "request",
                "Describe what you want to create (e.g., \"HTML landing page using CSS\").",
                true,
            ))
            .add_option(string_arg(
                "language",
                "The programming language to generate the code in.",
                true,
            )),
        command("help"),
        command("ping"),
        command("lock"),
        command("reload-commands"),
    ]
}

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn required_option<'a>(options: &'a [CommandDataOption], name: &str) -> Result<&'a str> {
    string_option(options, name).with_context(|| format!("Missing option '{}'", name))
}

fn attachment_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a Attachment> {
    let id = command
        .data
        .options
        .iter()
        .find(|option| option.name == name)?
        .value
        .as_attachment_id()?;
    command.data.resolved.attachments.get(&id)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keep a user-supplied language usable as a code fence tag.
fn fence_language(language: &str) -> String {
    language
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-'))
        .take(15)
        .collect::<String>()
        .to_lowercase()
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[\w+#.-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence regex")
});

/// Remove a single fence wrapping the whole text, if there is one.
fn strip_code_fences(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => text.trim().to_string(),
    }
}

fn help_text() -> String {
    let lines: Vec<String> = COMMANDS
        .iter()
        .map(|command| format!("**/{}**: {}", command.name, command.description))
        .collect();
    lines.join("\n")
}

fn debug_prompt(language: &str, code: &str) -> Option<String> {
    let name = match language {
        "java" => "Java",
        "javascript" => "JavaScript",
        "python" => "Python",
        _ => return None,
    };
    Some(format!(
        "Debug the following {} code and provide feedback:\n\n{}",
        name, code
    ))
}

/// Cut `text` to at most `max` characters, ending in an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn progress_embed(title: &str, description: String, colour: u32) -> CreateEmbed {
    CreateEmbed::new()
        .colour(colour)
        .title(truncate_chars(title, EMBED_TITLE_LIMIT))
        .description(truncate_chars(&description, EMBED_DESCRIPTION_LIMIT))
        .timestamp(Timestamp::now())
}

/// How one page of a generated answer is laid out in an embed.
struct PageLayout {
    title: String,
    intro: String,
    field: &'static str,
    fence: Option<String>,
    colour: u32,
}

impl PageLayout {
    fn field_value(&self, content: &str) -> String {
        match &self.fence {
            Some(language) => format!("```{}\n{}\n```", language, content),
            None if content.trim().is_empty() => "(empty response)".to_string(),
            None => content.to_string(),
        }
    }

    fn render(&self, view: &PageView) -> CreateEmbed {
        CreateEmbed::new()
            .colour(self.colour)
            .title(truncate_chars(&self.title, EMBED_TITLE_LIMIT))
            .description(truncate_chars(&self.intro, EMBED_DESCRIPTION_LIMIT))
            .field(self.field, self.field_value(&view.content), false)
            .footer(CreateEmbedFooter::new(format!(
                "Page {} of {}",
                view.page_number(),
                view.total
            )))
            .timestamp(Timestamp::now())
    }

    fn into_render(self) -> Render {
        Box::new(move |view| self.render(view))
    }
}

enum Controls {
    Buttons,
    Reactions,
}

/// Serve the pages in the background. If the first page never arrives the
/// user gets the generic error instead of a stuck "thinking" message.
fn spawn_presentation<C>(
    ctx: &Context,
    command: &CommandInteraction,
    mut channel: C,
    text: String,
    max_page_size: usize,
    options: SessionOptions,
) where
    C: ReplyChannel + 'static,
{
    let ctx = ctx.clone();
    let command = command.clone();
    let owner_id = command.user.id.get();
    tokio::spawn(async move {
        match present(&mut channel, &text, owner_id, max_page_size, options).await {
            Ok(reason) => tracing::debug!(?reason, owner_id, "presentation ended"),
            Err(e) => {
                tracing::error!("Failed to present response: {:#}", e);
                report_failure(&ctx, &command).await;
            }
        }
    });
}

async fn respond(ctx: &Context, command: &CommandInteraction, message: CreateInteractionResponseMessage) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
        .context("Failed to respond to command")
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
    .await
}

/// Tell the user the command failed, whether or not it already responded.
async fn report_failure(ctx: &Context, command: &CommandInteraction) {
    if respond_ephemeral(ctx, command, ERROR_MESSAGE).await.is_ok() {
        return;
    }

    let followup = CreateInteractionResponseFollowup::new()
        .content(ERROR_MESSAGE)
        .ephemeral(true);
    if let Err(e) = command.create_followup(&ctx.http, followup).await {
        tracing::error!("Failed to report command failure: {}", e);
    }
}

/// What the command handlers need besides the Discord context.
pub struct Commands {
    state: Arc<BotRuntimeState>,
    gemini: GeminiClient,
    pagination: PaginationConfig,
}

impl Commands {
    pub fn new(state: Arc<BotRuntimeState>, gemini: GeminiClient, pagination: PaginationConfig) -> Self {
        Self {
            state,
            gemini,
            pagination,
        }
    }

    pub fn state(&self) -> &Arc<BotRuntimeState> {
        &self.state
    }

    pub async fn dispatch(&self, ctx: &Context, command: &CommandInteraction) {
        let name = command.data.name.as_str();
        let user_id = command.user.id.get();

        if self.state.is_locked() && !self.state.is_owner(user_id) && name != "lock" {
            if let Err(e) = respond_ephemeral(ctx, command, LOCKED_MESSAGE).await {
                tracing::error!("Failed to send lock notice: {:#}", e);
            }
            return;
        }

        tracing::info!("/{} from {}", name, command.user.name);

        let result = match name {
            "createcontent" => self.createcontent(ctx, command).await,
            "snippet" => self.snippet(ctx, command).await,
            "debug" => self.debug(ctx, command).await,
            "document" => self.document(ctx, command).await,
            "imagine" => self.imagine(ctx, command).await,
            "help" => self.help(ctx, command).await,
            "ping" => self.ping(ctx, command).await,
            "lock" => self.lock(ctx, command).await,
            "reload-commands" => self.reload_commands(ctx, command).await,
            other => {
                tracing::warn!("Unknown command /{}", other);
                return;
            }
        };

        match result {
            Ok(()) => self.state.record_command(name).await,
            Err(e) => {
                tracing::error!("Failed to run /{}: {:#}", name, e);
                report_failure(ctx, command).await;
            }
        }
    }

    /// Ask Gemini, or apologize in a follow-up and return `None`.
    async fn generate(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        prompt: &str,
        what: &str,
    ) -> Result<Option<String>> {
        match self.gemini.generate(prompt).await {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::error!("Failed to generate {}: {:#}", what, e);
                let apology = CreateInteractionResponseFollowup::new()
                    .content(format!("Sorry, I couldn't generate {} at the moment.", what));
                command
                    .create_followup(&ctx.http, apology)
                    .await
                    .context("Failed to send apology")?;
                Ok(None)
            }
        }
    }

    fn present(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        text: String,
        layout: PageLayout,
        controls: Controls,
    ) {
        let max_page_size = self.pagination.max_page_size;
        let options = self.pagination.session_options();
        let render = layout.into_render();

        match controls {
            Controls::Buttons => spawn_presentation(
                ctx,
                command,
                ButtonReply::new(ctx.clone(), command.clone(), render),
                text,
                max_page_size,
                options,
            ),
            Controls::Reactions => spawn_presentation(
                ctx,
                command,
                ReactionReply::new(ctx.clone(), command.clone(), render),
                text,
                max_page_size,
                options,
            ),
        }
    }

    async fn createcontent(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let options = &command.data.options;
        let description = required_option(options, "description")?;
        let content_type = string_option(options, "content_type").unwrap_or("code");

        let progress = progress_embed(
            "Content Generation in Progress",
            format!("Generating {} content for: \"{}\"", content_type, description),
            BLUE,
        );
        respond(ctx, command, CreateInteractionResponseMessage::new().embed(progress)).await?;

        let prompt = format!("Create {} content. The task is: {}.", content_type, description);
        let Some(text) = self.generate(ctx, command, &prompt, "content").await? else {
            return Ok(());
        };

        let layout = PageLayout {
            title: format!("Generated {}", capitalize(content_type)),
            intro: format!("Here is the generated {} for \"{}\":", content_type, description),
            field: "Content",
            fence: Some(String::new()),
            colour: GREEN,
        };
        self.present(ctx, command, text, layout, Controls::Buttons);
        Ok(())
    }

    async fn snippet(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let options = &command.data.options;
        let language = required_option(options, "language")?;
        let description = required_option(options, "description")?;

        let progress = progress_embed(
            "Snippet Generation in Progress",
            format!("Generating a {} code snippet for: \"{}\"", language, description),
            BLUE,
        );
        respond(ctx, command, CreateInteractionResponseMessage::new().embed(progress)).await?;

        let prompt = format!(
            "Create a {} code snippet. The task is: {}.",
            language, description
        );
        let Some(text) = self.generate(ctx, command, &prompt, "a snippet").await? else {
            return Ok(());
        };

        let layout = PageLayout {
            title: format!("{} Code Snippet", capitalize(language)),
            intro: format!("Here is the generated code snippet for \"{}\":", description),
            field: "Snippet",
            fence: Some(fence_language(language)),
            colour: GREEN,
        };
        self.present(ctx, command, text, layout, Controls::Buttons);
        Ok(())
    }

    async fn debug(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let options = &command.data.options;
        let language = required_option(options, "language")?;

        let code = match attachment_option(command, "file") {
            Some(file) => {
                if file.size > MAX_ATTACHMENT_BYTES {
                    return respond_ephemeral(
                        ctx,
                        command,
                        "That file is too large to debug. Paste the relevant part instead.",
                    )
                    .await;
                }
                download_text(&file.url)
                    .await
                    .with_context(|| format!("Failed to download {}", file.filename))?
            }
            None => string_option(options, "code").unwrap_or_default().to_string(),
        };

        if code.trim().is_empty() {
            return respond_ephemeral(ctx, command, "Provide some code or attach a file to debug.").await;
        }

        let Some(prompt) = debug_prompt(language, &code) else {
            return respond_ephemeral(ctx, command, "Unsupported language.").await;
        };

        let progress = progress_embed(
            "Code Debugging",
            format!("Processing your {} code, please wait...", language),
            YELLOW,
        );
        respond(ctx, command, CreateInteractionResponseMessage::new().embed(progress)).await?;

        let Some(text) = self.generate(ctx, command, &prompt, "a response").await? else {
            return Ok(());
        };

        let layout = PageLayout {
            title: format!("{} Code Debugging", capitalize(language)),
            intro: format!("Here is the debugging feedback for your {} code:", language),
            field: "Output",
            fence: Some(String::new()),
            colour: YELLOW,
        };
        self.present(ctx, command, text, layout, Controls::Reactions);
        Ok(())
    }

    async fn document(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let options = &command.data.options;
        let subject = required_option(options, "function")?;
        let kind = string_option(options, "type").unwrap_or("documentation");

        let (prompt, title, intro, field) = if kind == "documentation" {
            (
                format!(
                    "Generate detailed documentation for the following function or code:\n\n{}",
                    subject
                ),
                "Documentation",
                "Here is the generated documentation:",
                "Documentation",
            )
        } else {
            (
                format!(
                    "Provide an explanation or answer the following question about this function or code:\n\n{}",
                    subject
                ),
                "Answer to your Question",
                "Here is the answer to your question:",
                "Answer",
            )
        };

        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await
            .context("Failed to defer command")?;

        let Some(text) = self.generate(ctx, command, &prompt, "a response").await? else {
            return Ok(());
        };

        let layout = PageLayout {
            title: title.to_string(),
            intro: intro.to_string(),
            field,
            fence: None,
            colour: GREEN,
        };
        self.present(ctx, command, text, layout, Controls::Buttons);
        Ok(())
    }

    async fn imagine(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let options = &command.data.options;
        let request = required_option(options, "request")?;
        let language = required_option(options, "language")?;

        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await
            .context("Failed to defer command")?;

        let prompt = format!(
            "Create the following project using {}: {}. Reply with only the code, \
             without explanations and without Markdown code fences.",
            language, request
        );
        let Some(text) = self.generate(ctx, command, &prompt, "the code").await? else {
            return Ok(());
        };

        let layout = PageLayout {
            title: format!("Generated {} Project", language),
            intro: format!("Here is the generated code for your request: \"{}\"", request),
            field: "Code",
            fence: Some(fence_language(language)),
            colour: GREEN,
        };
        self.present(ctx, command, strip_code_fences(&text), layout, Controls::Buttons);
        Ok(())
    }

    async fn help(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await
            .context("Failed to defer command")?;

        let layout = PageLayout {
            title: "Help".to_string(),
            intro: "Here are the available commands:".to_string(),
            field: "Commands",
            fence: None,
            colour: BLUE,
        };
        let options = SessionOptions {
            wraparound: Wraparound::Wrap,
            ..self.pagination.session_options()
        };

        spawn_presentation(
            ctx,
            command,
            ButtonReply::new(ctx.clone(), command.clone(), layout.into_render()),
            help_text(),
            HELP_PAGE_SIZE.min(self.pagination.max_page_size),
            options,
        );
        Ok(())
    }

    async fn ping(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let started = Instant::now();
        let pinging = progress_embed("Ping", "Pinging...".to_string(), GOLD);
        respond(ctx, command, CreateInteractionResponseMessage::new().embed(pinging)).await?;
        let latency = started.elapsed();

        tokio::time::sleep(Duration::from_secs(1)).await;

        let pong = progress_embed(
            "Pong!",
            format!("Latency is `{}ms`!", latency.as_millis()),
            GOLD,
        );
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(pong))
            .await
            .context("Failed to edit ping response")?;
        Ok(())
    }

    async fn lock(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !self.state.is_owner(command.user.id.get()) {
            return respond_ephemeral(ctx, command, NO_PERMISSION_MESSAGE).await;
        }

        let locked = self.state.toggle_lock();
        tracing::info!("Commands {}", if locked { "locked" } else { "unlocked" });

        let embed = progress_embed(
            "Command Lock Status",
            format!(
                "All commands have been {}.",
                if locked { "locked" } else { "unlocked" }
            ),
            if locked { RED } else { GREEN },
        );
        respond(ctx, command, CreateInteractionResponseMessage::new().embed(embed)).await
    }

    async fn reload_commands(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !self.state.is_owner(command.user.id.get()) {
            return respond_ephemeral(ctx, command, NO_PERMISSION_MESSAGE).await;
        }

        let content = match register(ctx).await {
            Ok(count) => {
                tracing::info!("Reloaded {} application commands", count);
                "Successfully reloaded application commands!"
            }
            Err(e) => {
                tracing::error!("Failed to reload commands: {:#}", e);
                "There was an error reloading the commands."
            }
        };
        respond(ctx, command, CreateInteractionResponseMessage::new().content(content)).await
    }
}

/// Replace the global command set with [`definitions`].
pub async fn register(ctx: &Context) -> Result<usize> {
    let commands = Command::set_global_commands(&ctx.http, definitions())
        .await
        .context("Failed to register slash commands")?;
    Ok(commands.len())
}

async fn download_text(url: &str) -> Result<String> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.text().await?)
}
