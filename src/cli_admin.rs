use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

mod cli_style;
use cli_style::{
    get_styles, print_empty_list, print_error, print_key_value, print_section_footer,
    print_section_header, print_success, print_warning, TableBuilder,
};

use genre_prediction_server::genre::{
    update_trends, GenreDeletionError, GenreDraft, GenreStore, TrendStore,
};
use genre_prediction_server::store::{SqliteStore, DB_FILE_NAME};
use genre_prediction_server::user::UserManager;

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", s));
    }
    Ok(path)
}

/// Administrative commands against the genre prediction database.
#[derive(Parser)]
#[command(styles = get_styles(), name = "cli-admin")]
struct CliArgs {
    /// Directory holding the SQLite database.
    #[clap(long, value_parser = parse_dir)]
    db_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a user with a password.
    AddUser {
        handle: String,
        email: String,
        password: String,
    },

    /// Replaces the password of an existing user.
    SetPassword { handle: String, password: String },

    /// Deletes a user together with their sessions, predictions and reviews.
    DeleteUser { handle: String },

    ListUsers,

    /// Creates a genre ahead of the classifier predicting it.
    AddGenre {
        name: String,
        #[clap(long, default_value = "")]
        description: String,
        /// Display color, e.g. "#1db954".
        #[clap(long, default_value = "")]
        color: String,
        #[clap(long, default_value = "")]
        external_id: String,
    },

    ListGenres,

    /// Deletes a genre. Refused while predictions reference it.
    DeleteGenre { name: String },

    /// Appends a trend snapshot for every genre right now.
    UpdateTrends,

    /// Shows the most recent trend snapshots.
    ShowTrends {
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

fn format_time(time: SystemTime) -> String {
    chrono::DateTime::<Utc>::from(time)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn execute(command: Command, store: Arc<SqliteStore>) -> Result<()> {
    let user_manager = UserManager::new(store.clone());

    match command {
        Command::AddUser {
            handle,
            email,
            password,
        } => {
            if user_manager.handle_exists(&handle)? {
                bail!("User {} already exists", handle);
            }
            let user_id = user_manager.add_user_with_password(&handle, &email, &password)?;
            print_success(&format!("Created user {} with id {}", handle, user_id));
        }
        Command::SetPassword { handle, password } => {
            user_manager.set_password(&handle, &password)?;
            print_success(&format!("Password of {} updated", handle));
        }
        Command::DeleteUser { handle } => {
            user_manager.delete_user(&handle)?;
            print_success(&format!("Deleted user {}", handle));
        }
        Command::ListUsers => {
            let users = user_manager.get_all_users()?;
            print_section_header("Users");
            if users.is_empty() {
                print_empty_list("No users yet");
            } else {
                let mut table = TableBuilder::new(vec!["Id", "Handle", "Email", "Joined"]);
                for user in users {
                    table.add_row(vec![
                        user.id.to_string(),
                        user.handle,
                        user.email,
                        format_time(user.created),
                    ]);
                }
                table.print();
            }
            print_section_footer();
        }
        Command::AddGenre {
            name,
            description,
            color,
            external_id,
        } => {
            let genre = store.create_genre(&GenreDraft {
                name,
                description,
                color,
                external_id,
            })?;
            print_success(&format!("Created genre {} with id {}", genre.name, genre.id));
        }
        Command::ListGenres => {
            let genres = store.list_genres()?;
            print_section_header("Genres");
            if genres.is_empty() {
                print_empty_list("No genres yet, they appear with the first prediction");
            } else {
                let mut table = TableBuilder::new(vec!["Id", "Name", "Color", "Description"]);
                for genre in genres {
                    table.add_row(vec![
                        genre.id.to_string(),
                        genre.name,
                        genre.color,
                        genre.description,
                    ]);
                }
                table.print();
            }
            print_section_footer();
        }
        Command::DeleteGenre { name } => {
            let genre = store
                .get_genre_by_name(&name)?
                .with_context(|| format!("Genre {} not found", name))?;
            match store.delete_genre(genre.id) {
                Ok(()) => print_success(&format!("Deleted genre {}", name)),
                Err(GenreDeletionError::Protected { predictions, .. }) => {
                    print_warning(&format!(
                        "{} is still referenced by {} prediction(s), nothing deleted",
                        name, predictions
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::UpdateTrends => {
            let snapshots = update_trends(store.as_ref(), Utc::now())?;
            print_section_header("Trend update");
            if snapshots.is_empty() {
                print_empty_list("No genres to score");
            }
            for snapshot in snapshots {
                print_key_value(&snapshot.genre_name, &format!("{:.2}", snapshot.score));
            }
            print_section_footer();
        }
        Command::ShowTrends { limit } => {
            let history = store.trend_history(limit)?;
            print_section_header("Trend history");
            if history.is_empty() {
                print_empty_list("No snapshots recorded");
            } else {
                let mut table = TableBuilder::new(vec!["Date", "Genre", "Score"]);
                for trend in history {
                    table.add_row(vec![
                        trend.date.to_string(),
                        trend.genre_name,
                        format!("{:.2}", trend.score),
                    ]);
                }
                table.print();
            }
            print_section_footer();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let db_path = cli_args.db_dir.join(DB_FILE_NAME);
    let store = Arc::new(
        SqliteStore::new(&db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?,
    );

    if let Err(err) = execute(cli_args.command, store) {
        print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}
