use tracing::{error, info};

use crate::ai::{Assistant, Turn};
use crate::bot::handlers::{Context, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::Session;

pub async fn enter<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::ChoosingPersona;

    let text = ctx.resources.message_or("talk", "Choose who you want to talk to:").await;
    ctx.illustrated("talk", text, Menu::Personas)
}

/// Persona button. Loads `prompts/talk_<id>.txt` as the system prompt and
/// starts a fresh history.
pub async fn choose<A: Assistant>(ctx: &Context<A>, session: &mut Session, persona_id: &str) -> Reply {
    let Some(persona) = ctx.catalog.persona(persona_id) else {
        return Reply::with_menu("This persona is not available. Pick another one.", Menu::Personas);
    };

    let prompt_name = format!("talk_{}", persona.id);
    let prompt = match ctx.resources.prompt(&prompt_name).await {
        Ok(prompt) => prompt,
        Err(e) => {
            error!("Persona prompt missing: {e}");
            return Reply::with_menu("Could not load this persona. Try another one.", Menu::Personas);
        }
    };

    info!("Persona selected: {}", persona.id);
    *session = Session::Talk {
        persona: persona.id.clone(),
        prompt: prompt.to_string(),
        history: Vec::new(),
    };

    ctx.illustrated(
        &prompt_name,
        format!("You are talking to {}. Send a message:", persona.name),
        Menu::TalkExit,
    )
}

pub async fn say<A: Assistant>(ctx: &Context<A>, session: &mut Session, text: &str) -> Reply {
    let Session::Talk { prompt, history, .. } = session else {
        return not_chosen();
    };

    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(Turn::system(prompt.as_str()));
    turns.extend(history.iter().cloned());
    turns.push(Turn::user(text));

    match ctx.assistant.complete(&turns).await {
        Ok(answer) => {
            history.push(Turn::user(text));
            history.push(Turn::assistant(answer.as_str()));
            Reply::with_menu(answer, Menu::TalkExit)
        }
        Err(e) => upstream_failure("Persona reply", &e, Menu::TalkExit),
    }
}

/// Text while the persona keyboard is up.
pub fn not_chosen() -> Reply {
    Reply::with_menu("Choose who you want to talk to first.", Menu::Personas)
}
