//! `contextos enhance` — Submit a prompt, wait for it, print the composite.
//!
//! Progress goes to stderr; only the composite is written to stdout.

use contextos_core::event::DomainEvent;
use contextos_engine::Panel;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use super::{CmdResult, open_panel, require_key};

pub async fn run(
    prompt: String,
    contexts: Vec<String>,
    extracts: bool,
    ask_questions: bool,
) -> CmdResult {
    let (_, panel) = open_panel().await?;
    require_key(&panel).await?;

    panel.refresh_contexts().await?;
    for id in &contexts {
        if panel.catalog().get(id).await.is_none() {
            eprintln!("  [Warning] Unknown or unpublished context: {id}");
        }
    }

    let progress = tokio::spawn(report_progress(panel.events().subscribe()));
    let engine = panel.engine();

    let prompt_id = engine.submit(&prompt, contexts).await?;
    eprintln!("  Submitted ({prompt_id}), waiting for enhancement...");
    engine.settle().await.transpose()?;

    if ask_questions && engine.state().await.clarification_pending {
        let questions = engine
            .session()
            .await
            .map(|s| s.questions)
            .unwrap_or_default();
        eprintln!("\n  A few questions to sharpen the result (Enter to skip):\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        for (index, question) in questions.iter().enumerate() {
            eprint!("  {} > ", question.question);
            std::io::stderr().flush()?;
            let answer = lines.next_line().await?.unwrap_or_default();
            engine.set_answer(index, answer).await;
        }

        let answered = engine
            .session()
            .await
            .map(|s| s.questions)
            .unwrap_or_default();
        engine.submit_answers(answered).await?;
        eprintln!("  Answers sent, waiting for the updated prompt...");
        engine.settle().await.transpose()?;
    }

    progress.abort();

    if extracts {
        select_all_extracts(&panel).await;
    }

    match panel.composite().await {
        Some(text) if !text.is_empty() => println!("{text}"),
        _ => return Err("The service returned no enhanced prompt".into()),
    }
    Ok(())
}

/// Mark every extract of the live session as selected.
pub async fn select_all_extracts(panel: &Panel) {
    let Some(session) = panel.engine().session().await else {
        return;
    };
    for extract in session.file_extracts.iter().filter(|e| !e.selected) {
        panel.engine().toggle_extract(&extract.id).await;
    }
}

async fn report_progress(mut rx: broadcast::Receiver<std::sync::Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.as_ref() {
                DomainEvent::SessionUpdated {
                    status, attempt, ..
                } => {
                    tracing::debug!(%status, attempt, "Poll");
                }
                DomainEvent::ClarificationRequested { questions, .. } => {
                    eprintln!("  The service asked {questions} clarifying question(s).");
                }
                DomainEvent::SessionFailed { error_message, .. } => {
                    eprintln!("  [Error] {error_message}");
                }
                _ => {}
            },
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
