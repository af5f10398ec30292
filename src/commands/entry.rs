use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::{EntryDraft, EntryPatch, Mood, SyncState};
use crate::remote::RemoteStore;
use crate::sync::DiaryService;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct EntryCommand {
    #[command(subcommand)]
    pub command: EntrySubcommand,
}

#[derive(Subcommand)]
pub enum EntrySubcommand {
    /// Write a new diary entry
    Add {
        /// Entry title
        title: String,

        /// Entry content (HTML or plain text)
        #[arg(long)]
        content: String,

        /// Mood (happy, sad, angry, surprised, tired, love)
        #[arg(long, short)]
        mood: Option<String>,

        /// Tag (can be repeated)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Path to an image to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// List entries
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a single entry
    Show {
        /// Entry ID
        id: String,
    },

    /// Edit an existing entry
    Edit {
        /// Entry ID
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        #[arg(long, short)]
        mood: Option<String>,

        /// Replace all tags (can be repeated)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Delete an entry
    Delete {
        /// Entry ID
        id: String,
    },
}

impl EntryCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        service: &mut DiaryService<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            EntrySubcommand::Add {
                title,
                content,
                mood,
                tags,
                date,
                image,
            } => {
                let mut draft = EntryDraft::new(title, content).with_tags(tags.clone());
                if let Some(mood) = mood {
                    draft = draft.with_mood(mood.parse::<Mood>()?);
                }
                if let Some(date) = date {
                    draft = draft.with_date(parse_date(date)?);
                }
                if let Some(path) = image {
                    match upload_image(service, path).await? {
                        Some(url) => draft = draft.with_image(url),
                        None => {
                            eprintln!("Image upload unavailable, saving entry without it");
                        }
                    }
                }

                let saved = service.save_entry(draft).await?;
                match saved.remote_id {
                    Some(_) => println!("Created entry {} (synced)", saved.id),
                    None => println!(
                        "Created entry {} ({} operation(s) pending sync)",
                        saved.id,
                        service.pending_sync_count()
                    ),
                }
            }

            EntrySubcommand::List { format } => {
                let entries = service.get_entries().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    }
                    OutputFormat::Text => {
                        if entries.is_empty() {
                            println!("No entries yet.");
                        }
                        for entry in &entries {
                            let mood = entry
                                .mood
                                .map(|m| format!(" [{}]", m))
                                .unwrap_or_default();
                            let state = match entry.sync_state() {
                                SyncState::Synced { .. } if !entry.needs_sync => "synced",
                                _ => "pending",
                            };
                            println!(
                                "{}  {}  {}{}  ({})",
                                entry.id, entry.date, entry.title, mood, state
                            );
                        }
                    }
                }
            }

            EntrySubcommand::Show { id } => {
                let id = parse_id(id)?;
                match service.get_entry_by_id(id).await? {
                    Some(entry) => {
                        println!("{}", entry.title);
                        println!("{}", "=".repeat(entry.title.len()));
                        println!("Date: {}", entry.date);
                        if let Some(mood) = entry.mood {
                            println!("Mood: {}", mood);
                        }
                        if !entry.tags.is_empty() {
                            println!("Tags: {}", entry.tags.join(", "));
                        }
                        if let Some(image) = &entry.image {
                            println!("Image: {}", image);
                        }
                        println!();
                        println!("{}", entry.content);
                    }
                    None => return Err(format!("Entry not found: {}", id).into()),
                }
            }

            EntrySubcommand::Edit {
                id,
                title,
                content,
                mood,
                tags,
                date,
            } => {
                let id = parse_id(id)?;
                let mut patch = EntryPatch {
                    title: title.clone(),
                    content: content.clone(),
                    ..Default::default()
                };
                if let Some(mood) = mood {
                    patch.mood = Some(Some(mood.parse::<Mood>()?));
                }
                if !tags.is_empty() {
                    patch.tags = Some(tags.clone());
                }
                if let Some(date) = date {
                    patch.date = Some(parse_date(date)?);
                }

                service.update_entry(id, patch).await?;
                println!("Updated entry {}", id);
            }

            EntrySubcommand::Delete { id } => {
                let id = parse_id(id)?;
                service.delete_entry(id).await?;
                println!("Deleted entry {}", id);
            }
        }

        Ok(())
    }
}

async fn upload_image<R: RemoteStore>(
    service: &DiaryService<R>,
    path: &Path,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read image '{}': {}", path.display(), e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.bin".to_string());
    Ok(service.attach_image(bytes, &file_name).await)
}

fn parse_id(id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|_| format!("Invalid entry ID '{}'", id))
}

fn parse_date(date: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", date))
}
