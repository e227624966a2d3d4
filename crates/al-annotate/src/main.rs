use std::collections::HashMap;
use std::io::{self, Write};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "al-annotate", about = "Command-line client for the auto-labeling server")]
struct Args {
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    api_base: String,
    #[arg(long, default_value = "", global = true)]
    api_key: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the model's prediction for one document.
    Predict { project: i64, document: i64 },
    /// Train the project's model on your annotations of one document.
    Train { project: i64, document: i64 },
    /// Retrain the project's model from every stored annotation.
    Rebuild { project: i64 },
    /// Replace your annotations of a document with the prediction.
    Accept { project: i64, document: i64 },
    /// Walk through documents you have not annotated yet.
    Review {
        project: i64,
        /// Train on each accepted document before moving on.
        #[arg(long, default_value = "false")]
        train: bool,
    },
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LabelBody {
    id: i64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    id: i64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SpanBody {
    label: i64,
    start_offset: usize,
    end_offset: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionBody {
    Class { label: i64 },
    Spans(Vec<SpanBody>),
}

impl PredictionBody {
    fn is_empty(&self) -> bool {
        matches!(self, Self::Spans(spans) if spans.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TrainingBody {
    quality: f64,
    examples: usize,
}

// ---------------------------------------------------------------------------
// Api: thin authenticated HTTP client
// ---------------------------------------------------------------------------

struct Api {
    client: reqwest::Client,
    base: String,
    key: String,
}

impl Api {
    fn new(base: &str, key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_owned(),
            key: key.to_owned(),
        }
    }

    async fn call(&self, method: reqwest::Method, path: &str) -> Result<Value, String> {
        let mut req = self.client.request(method.clone(), format!("{}{path}", self.base));
        if method != reqwest::Method::GET {
            req = req.json(&serde_json::json!({}));
        }
        if !self.key.is_empty() {
            req = req.bearer_auth(&self.key);
        }

        let response = req.send().await.map_err(|err| {
            format!("Connection error: {err}. Please check --api-base and server status.")
        })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|v| v.error.message)
                .unwrap_or(body);
            return Err(format!("Request failed ({status}): {message}"));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| format!("Invalid response: {err}"))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<T, String> {
        let value = self.call(method, path).await?;
        serde_json::from_value(value).map_err(|err| format!("Unexpected response: {err}"))
    }

    async fn labels(&self, project: i64) -> Result<HashMap<i64, String>, String> {
        let labels: Vec<LabelBody> = self
            .fetch(reqwest::Method::GET, &format!("/api/projects/{project}/labels"))
            .await?;
        Ok(labels.into_iter().map(|l| (l.id, l.text)).collect())
    }

    async fn document(&self, project: i64, document: i64) -> Result<DocumentBody, String> {
        self.fetch(
            reqwest::Method::GET,
            &format!("/api/projects/{project}/docs/{document}"),
        )
        .await
    }

    async fn predict(&self, project: i64, document: i64) -> Result<PredictionBody, String> {
        self.fetch(
            reqwest::Method::GET,
            &format!("/api/projects/{project}/docs/{document}/auto-labeling"),
        )
        .await
    }

    async fn train(&self, project: i64, document: i64) -> Result<TrainingBody, String> {
        self.fetch(
            reqwest::Method::PUT,
            &format!("/api/projects/{project}/docs/{document}/auto-labeling"),
        )
        .await
    }

    async fn accept(&self, project: i64, document: i64) -> Result<Value, String> {
        self.call(
            reqwest::Method::POST,
            &format!("/api/projects/{project}/docs/{document}/auto-labeling/accept"),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn label_name(labels: &HashMap<i64, String>, id: i64) -> String {
    labels
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("#{id}"))
}

/// `text` with predicted spans highlighted and tagged. Offsets count chars.
fn highlight(text: &str, spans: &[SpanBody], labels: &HashMap<i64, String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut cursor = 0;

    for span in spans {
        let start = span.start_offset.min(chars.len());
        let end = span.end_offset.min(chars.len());
        if start < cursor || start >= end {
            continue;
        }
        out.extend(&chars[cursor..start]);
        let covered: String = chars[start..end].iter().collect();
        out.push_str(&covered.black().on_bright_yellow().to_string());
        out.push_str(&format!("[{}]", label_name(labels, span.label)).bright_yellow().to_string());
        cursor = end;
    }
    out.extend(&chars[cursor..]);
    out
}

fn render(text: &str, prediction: &PredictionBody, labels: &HashMap<i64, String>) -> String {
    match prediction {
        PredictionBody::Class { label } => format!(
            "{text}\n{} {}",
            "=>".bright_cyan(),
            label_name(labels, *label).bright_yellow()
        ),
        PredictionBody::Spans(spans) if spans.is_empty() => {
            format!("{text}\n{}", "=> <no prediction>".dimmed())
        }
        PredictionBody::Spans(spans) => highlight(text, spans, labels),
    }
}

fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(input.trim().to_owned())),
        Err(err) => Err(err),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn show_prediction(api: &Api, project: i64, document: i64) -> Result<(), String> {
    let labels = api.labels(project).await?;
    let doc = api.document(project, document).await?;
    let prediction = api.predict(project, document).await?;
    println!("{}", render(&doc.text, &prediction, &labels));
    Ok(())
}

fn print_training(outcome: &TrainingBody) {
    println!(
        "{}",
        format!(
            "Model trained on {} examples, quality {:.3}",
            outcome.examples, outcome.quality
        )
        .bright_green()
    );
}

async fn review(api: &Api, project: i64, train: bool) -> Result<(), String> {
    let labels = api.labels(project).await?;
    let pending: Vec<DocumentBody> = api
        .fetch(
            reqwest::Method::GET,
            &format!("/api/projects/{project}/docs?is_checked=false"),
        )
        .await?;
    if pending.is_empty() {
        println!("{}", "Nothing left to review.".bright_green());
        return Ok(());
    }

    for (i, doc) in pending.iter().enumerate() {
        println!(
            "\n{}",
            format!("Document {} ({}/{})", doc.id, i + 1, pending.len()).bright_cyan()
        );
        let prediction = api.predict(project, doc.id).await?;
        println!("{}", render(&doc.text, &prediction, &labels));
        // the server refuses to accept an empty prediction
        if prediction.is_empty() {
            continue;
        }

        let choice = loop {
            let input = match prompt_line("[a]ccept / [s]kip / [q]uit: ") {
                Ok(Some(value)) => value,
                Ok(None) => return Ok(()),
                Err(err) => return Err(format!("failed to read input: {err}")),
            };
            match input.to_ascii_lowercase().as_str() {
                "a" | "s" | "q" => break input.to_ascii_lowercase(),
                _ => eprintln!("{}", "Please enter a, s, or q.".yellow()),
            }
        };

        match choice.as_str() {
            "q" => break,
            "s" => continue,
            _ => {
                api.accept(project, doc.id).await?;
                println!("{}", "Accepted.".bright_green());
                if train {
                    print_training(&api.train(project, doc.id).await?);
                }
            }
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), String> {
    let api = Api::new(&args.api_base, &args.api_key);
    match args.command {
        Command::Predict { project, document } => show_prediction(&api, project, document).await,
        Command::Train { project, document } => {
            print_training(&api.train(project, document).await?);
            Ok(())
        }
        Command::Rebuild { project } => {
            let outcome: TrainingBody = api
                .fetch(
                    reqwest::Method::POST,
                    &format!("/api/projects/{project}/auto-labeling/rebuild"),
                )
                .await?;
            print_training(&outcome);
            Ok(())
        }
        Command::Accept { project, document } => {
            let written = api.accept(project, document).await?;
            let count = written.as_array().map_or(0, Vec::len);
            println!(
                "{}",
                format!("Accepted {count} annotation(s).").bright_green()
            );
            Ok(())
        }
        Command::Review { project, train } => review(&api, project, train).await,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(message) = run(args).await {
        eprintln!("{}", message.red());
        std::process::exit(1);
    }
}
