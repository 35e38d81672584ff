//! Interactive interview loop.
//!
//! Wires the real microphone, speech engine, backend client and session
//! store into an [`InterviewFlow`] and drives it from stdin commands.

use crate::audio::capture::CpalMicrophone;
use crate::audio::recorder::Recorder;
use crate::config::Config;
use crate::defaults;
use crate::error::VivaprepError;
use crate::net::api::{HttpApi, InterviewApi};
use crate::net::submit::SubmissionCoordinator;
use crate::session::flow::{InterviewFlow, SubmitProgress};
use crate::session::store::SessionStore;
use crate::speech::announcer::Announcer;
use crate::speech::synth::{EspeakSynth, SpeechSynth, check_engine_available};
use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const HELP: &str = "\
Commands:
  record   start recording an answer (re-recording discards the old take)
  stop     stop recording
  redo     throw away the recorded answer
  submit   send the recorded answer
  say      read the current question aloud again
  mute     toggle reading questions aloud
  cancel   abandon the interview (asks for confirmation)
  quit     leave without abandoning; the result stays checkable
  help     show this list";

/// Run the interactive interview.
pub async fn run_interview(config: Config, no_speech: bool) -> Result<()> {
    let api = Arc::new(HttpApi::new(&config.server.url)?);
    let store = SessionStore::open_default()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // A leftover record means a previous run never saw its analysis
    if let Some(record) = store.load()? {
        if record.analysis.is_some() {
            println!("A finished interview is stored; see it with `vivaprep results`.");
            if !ask_yes(&mut lines, "Start a new interview and forget it?").await? {
                return Ok(());
            }
        } else {
            println!("An interview from a previous run is still waiting for its analysis.");
            if ask_yes(&mut lines, "Check for the result now?").await? {
                let mut flow = build_flow(&config, Arc::clone(&api), store, no_speech).await?;
                return finish_resumed(&mut flow, record).await;
            }
        }
        // Starting fresh supersedes the old session
    }

    let mut flow = build_flow(&config, Arc::clone(&api), store, no_speech).await?;

    println!("Connecting to {}...", config.server.url);
    flow.start(api.as_ref()).await?;
    println!(
        "Interview started: {} questions. Type `help` for commands.",
        flow.questions().len()
    );

    // Cancel from Ctrl-C even while a submit or poll is in flight
    let signal_token = flow.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    print_question(&flow);

    loop {
        if flow.cancel_token().is_cancelled() {
            flow.cancel();
            println!("Interview cancelled.");
            return Ok(());
        }

        let line = read_command(&mut lines, &flow).await?;
        let Some(line) = line else {
            // stdin closed; leave the session checkable later
            return Ok(());
        };

        match line.trim() {
            "" => {}
            "record" | "r" => match flow.start_recording() {
                Ok(()) => println!("Recording... type `stop` when done."),
                Err(e) => eprintln!("{}", e),
            },
            "stop" | "s" => match flow.stop_recording() {
                Ok(()) => println!("Recorded. `submit` to send it, `redo` to try again."),
                Err(e) => eprintln!("{}", e),
            },
            "redo" => {
                flow.discard_answer();
                println!("Take discarded. `record` to try again.");
            }
            "submit" => {
                if flow.is_recording() {
                    eprintln!("Still recording; `stop` first.");
                    continue;
                }
                match flow.submit_answer().await {
                    Ok(SubmitProgress::Advanced { next_index }) => {
                        println!(
                            "Answer accepted. Question {} of {}.",
                            next_index + 1,
                            flow.questions().len()
                        );
                        print_question(&flow);
                    }
                    Ok(SubmitProgress::Completed(analysis)) => {
                        println!("Interview complete. Analysis:");
                        println!("{}", analysis.to_pretty());
                        return Ok(());
                    }
                    Ok(SubmitProgress::ResultPending) => {
                        println!(
                            "All answers are in, but the analysis is taking longer than \
                             expected. Check later with `vivaprep results`."
                        );
                        return Ok(());
                    }
                    Ok(SubmitProgress::Cancelled) => {
                        println!("Interview cancelled.");
                        return Ok(());
                    }
                    Err(e @ VivaprepError::SubmissionTimeout) => {
                        eprintln!("{}", e);
                        eprintln!("Your answer is kept; `submit` to retry or `redo` it.");
                    }
                    Err(e) => {
                        eprintln!("{}", e);
                        eprintln!("Your answer is kept; `submit` to retry.");
                    }
                }
            }
            "say" => flow.announce_current().await,
            "mute" => {
                let enabled = !flow.speech_enabled();
                flow.set_speech_enabled(enabled);
                println!(
                    "Questions will {}be read aloud.",
                    if enabled { "" } else { "not " }
                );
            }
            "cancel" => {
                if ask_yes(&mut lines, "Abandon this interview?").await? {
                    flow.cancel();
                    println!("Interview cancelled.");
                    return Ok(());
                }
            }
            "quit" | "q" => {
                flow.set_speech_enabled(false);
                println!("Leaving. The session stays stored; `vivaprep results` checks on it.");
                return Ok(());
            }
            "help" | "?" => println!("{}", HELP),
            other => eprintln!("Unknown command `{}`; type `help`.", other),
        }
    }
}

async fn build_flow(
    config: &Config,
    api: Arc<HttpApi>,
    store: SessionStore,
    no_speech: bool,
) -> Result<InterviewFlow<CpalMicrophone>> {
    let mic = CpalMicrophone::new(config.audio.device.as_deref())?;
    let synth: Arc<dyn SpeechSynth> = Arc::new(EspeakSynth::new().with_rate(config.speech.rate));
    let mut announcer = Announcer::new(synth, &config.speech.language);

    let speech_on = config.speech.enabled && !no_speech;
    if speech_on {
        check_engine_available().await;
    }
    announcer.set_enabled(speech_on);

    Ok(InterviewFlow::new(
        SubmissionCoordinator::new(api as Arc<dyn InterviewApi>),
        Recorder::new(mic),
        announcer,
        store,
    ))
}

/// Resume a stored session: wait for its analysis and report.
async fn finish_resumed(
    flow: &mut InterviewFlow<CpalMicrophone>,
    record: crate::session::store::PersistedSession,
) -> Result<()> {
    println!("Checking for the analysis...");
    match flow.resume(record).await? {
        SubmitProgress::Completed(analysis) => {
            println!("{}", analysis.to_pretty());
        }
        SubmitProgress::ResultPending => {
            println!("Still not ready. Try again later with `vivaprep results`.");
        }
        _ => {}
    }
    Ok(())
}

/// Read the next command line; while recording, keep the elapsed-time
/// display ticking instead of blocking silently.
async fn read_command(
    lines: &mut Lines<BufReader<Stdin>>,
    flow: &InterviewFlow<CpalMicrophone>,
) -> Result<Option<String>> {
    prompt("> ")?;
    loop {
        if !flow.is_recording() {
            return Ok(lines.next_line().await?);
        }

        tokio::select! {
            line = lines.next_line() => return Ok(line?),
            _ = tokio::time::sleep(defaults::RECORDING_TICK) => {
                if let Some(secs) = flow.recording_elapsed_secs() {
                    print!("\r  recording {}s  ", secs);
                    std::io::stdout().flush()?;
                }
            }
        }
    }
}

async fn ask_yes(lines: &mut Lines<BufReader<Stdin>>, question: &str) -> Result<bool> {
    prompt(&format!("{} [yes/no] ", question))?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(answer.trim().eq_ignore_ascii_case("yes") || answer.trim().eq_ignore_ascii_case("y"))
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(())
}

fn print_question(flow: &InterviewFlow<CpalMicrophone>) {
    if let Some(question) = flow.current_question() {
        println!();
        println!("  {}", question);
        println!();
    }
}

/// Show the analysis of the stored session, polling if it is not in yet.
pub async fn show_results(config: Config) -> Result<()> {
    let store = SessionStore::open_default()?;
    let Some(record) = store.load()? else {
        println!("No stored interview.");
        return Ok(());
    };

    if let Some(analysis) = &record.analysis {
        println!("{}", analysis.to_pretty());
        return Ok(());
    }

    let api = Arc::new(HttpApi::new(&config.server.url)?);
    let coordinator = SubmissionCoordinator::new(api as Arc<dyn InterviewApi>);
    let cancel = tokio_util::sync::CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    println!("Checking for the analysis...");
    match coordinator.await_analysis(&record.session_id, &cancel).await {
        crate::net::submit::AnalysisPoll::Ready(analysis) => {
            store.save(&crate::session::store::PersistedSession {
                session_id: record.session_id,
                analysis: Some(analysis.clone()),
            })?;
            println!("{}", analysis.to_pretty());
        }
        crate::net::submit::AnalysisPoll::TimedOut => {
            println!("Still not ready. Try again later.");
        }
        crate::net::submit::AnalysisPoll::Cancelled => {}
    }
    Ok(())
}

/// Forget the stored session.
pub fn reset_session() -> Result<()> {
    let store = SessionStore::open_default()?;
    store.clear()?;
    println!("Stored interview forgotten.");
    Ok(())
}
