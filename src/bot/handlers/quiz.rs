use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::ai::{Assistant, Turn};
use crate::bot::handlers::{Context, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::{QuizPhase, QuizState, Session};
use crate::config::Topic;

/// A verdict counts as correct when its first word is "correct".
/// "Wrong! The correct answer is ..." and "Incorrect" do not match.
static CORRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\W*correct\b").expect("static regex"));

pub fn is_correct(verdict: &str) -> bool {
    CORRECT_RE.is_match(verdict.trim())
}

fn question_prompt(topic: &Topic, previous: Option<&str>) -> String {
    let mut prompt = format!(
        "Ask me one quiz question about {}. The answer must be short, a few words at most. \
         Avoid questions with numeric answers. Reply with the question only.",
        topic.subject
    );
    if let Some(previous) = previous {
        prompt.push_str(&format!(" Do not repeat this question: \"{previous}\"."));
    }
    prompt
}

fn judge_prompt(question: &str, answer: &str) -> String {
    format!(
        "Quiz question: {question}\nUser's answer: {answer}\n\n\
         If the answer is correct or very close to correct, reply with exactly \"Correct!\". \
         Otherwise reply in the form \"Wrong! The correct answer is: <answer>\"."
    )
}

fn score_line(quiz: &QuizState) -> String {
    format!("Your score: {}/{}", quiz.score, quiz.answered)
}

pub async fn enter<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::Quiz(QuizState::new());

    let text = ctx.resources.message_or("quiz", "Pick a quiz topic:").await;
    ctx.illustrated("quiz", text, Menu::QuizTopics)
}

/// Topic button: generate the first question on it.
pub async fn choose_topic<A: Assistant>(ctx: &Context<A>, session: &mut Session, topic_id: &str) -> Reply {
    let Session::Quiz(quiz) = session else {
        return not_in_quiz();
    };
    let Some(topic) = ctx.catalog.topic(topic_id) else {
        return Reply::with_menu("This topic is not available. Pick another one.", Menu::QuizTopics);
    };
    info!("Quiz topic selected: {}", topic.id);
    ask(ctx, quiz, topic, None, Menu::QuizTopics).await
}

/// "Next question" on the current topic.
pub async fn next<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    let Session::Quiz(quiz) = session else {
        return not_in_quiz();
    };
    let Some(topic) = quiz.topic.as_deref().and_then(|id| ctx.catalog.topic(id)) else {
        return Reply::with_menu("Pick a topic first.", Menu::QuizTopics);
    };
    let previous = quiz.last_question().map(str::to_string);
    ask(ctx, quiz, topic, previous.as_deref(), Menu::QuizControl).await
}

async fn ask<A: Assistant>(
    ctx: &Context<A>,
    quiz: &mut QuizState,
    topic: &Topic,
    previous: Option<&str>,
    menu_on_failure: Menu,
) -> Reply {
    let prompt = question_prompt(topic, previous);
    match ctx.assistant.complete(&[Turn::user(prompt)]).await {
        Ok(question) => {
            let question = question.trim().to_string();
            let text = format!("Question ({}): {question}\n\nWrite your answer:", topic.label);
            quiz.ask(&topic.id, question);
            Reply::text(text)
        }
        Err(e) => upstream_failure("Quiz question", &e, menu_on_failure),
    }
}

/// Text while a quiz is running.
pub async fn answer<A: Assistant>(ctx: &Context<A>, session: &mut Session, text: &str) -> Reply {
    let Session::Quiz(quiz) = session else {
        return not_in_quiz();
    };

    let question = match &quiz.phase {
        QuizPhase::Asking { question } => question.clone(),
        QuizPhase::Answered { .. } => {
            return Reply::with_menu(
                "That question is already scored. Ask for the next one or finish the quiz.",
                Menu::QuizControl,
            );
        }
        QuizPhase::ChoosingTopic => {
            return Reply::with_menu("Pick a topic first.", Menu::QuizTopics);
        }
    };

    let verdict = match ctx.assistant.complete(&[Turn::user(judge_prompt(&question, text))]).await {
        Ok(verdict) => verdict,
        Err(e) => return upstream_failure("Quiz verdict", &e, Menu::QuizControl),
    };

    quiz.judge(is_correct(&verdict));
    Reply::with_menu(format!("{}\n\n{}", verdict.trim(), score_line(quiz)), Menu::QuizControl)
}

pub fn change_topic(session: &mut Session) -> Reply {
    let Session::Quiz(quiz) = session else {
        return not_in_quiz();
    };
    quiz.change_topic();
    Reply::with_menu(format!("Choose a new topic. {}", score_line(quiz)), Menu::QuizTopics)
}

pub fn end(session: &mut Session) -> Reply {
    let Session::Quiz(quiz) = session else {
        return not_in_quiz();
    };
    let text = format!(
        "Quiz finished! Final score: {}/{}\nSend /quiz to play again or /start for the main menu.",
        quiz.score, quiz.answered
    );
    *session = Session::Idle;
    Reply::with_menu(text, Menu::Main)
}

fn not_in_quiz() -> Reply {
    Reply::with_menu("No quiz is running. Send /quiz to start one.", Menu::Main)
}
