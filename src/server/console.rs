// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The operator console on stdin.
//!
//! Console mutations follow the same discipline as session mutations: the
//! journal record is submitted while the store's writer guard is held, so
//! the journal's order is the linearization order, and only the fsync wait
//! crosses the guard boundary. User-table commands hold the User writer for
//! the whole move-and-snapshot sequence, so a promotion or demotion is
//! atomic for every observer and the on-disk tables always reflect the move
//! together.

use std::{io::Write as _, sync::Arc};

use anyhow::anyhow;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader, Lines},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    auth::{self, UserClass},
    cfg::config::Config,
    journal::{JournalHandle, JournalOp},
    models::{
        record::Record,
        validate::{self, MAX_NUMBERS},
    },
    server::Stores,
    store::{snapshot, sorted::SortedStore},
};

const MENU: &str = "\n\nAvailable commands:\n\t- Administration:\n\t\t0: Safe shutdown.\n\t- Main store:\n\t\t1: Print main store.\n\t\t2: Add main record. (or modify an already existing one)\n\t\t3: Remove main record.\n\t- Privileged users:\n\t\t4: Print privileged users.\n\t\t5: Add privileged user. (or modify password of an already existing one)\n\t\t6: Remove privileged user.\n\t- Normal users:\n\t\t7: Print normal users.\n\t\t8: Add normal user. (or modify password of an already existing one)\n\t\t9: Remove normal user.\n\nEnter command: ";
const INVALID_COMMAND: &str = "Invalid command, try again.";

struct Console<R> {
    lines: Lines<BufReader<R>>,
    shutdown: CancellationToken,
}

impl<R: AsyncRead + Unpin> Console<R> {
    fn new(input: R, shutdown: CancellationToken) -> Self {
        Self {
            lines: BufReader::new(input).lines(),
            shutdown,
        }
    }

    /// Prompts and reads one line. `None` means the input closed or a
    /// shutdown was requested elsewhere; the console loop ends either way.
    async fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            res = self.lines.next_line() => match res {
                Ok(Some(line)) => Some(line.trim().to_string()),
                _ => None,
            },
        }
    }

    async fn read_name(&mut self) -> Option<String> {
        loop {
            let name = self.read_line("Enter Name: ").await?;
            if validate::check_name(&name) {
                return Some(validate::format_name(&name));
            }
            println!(
                "ERROR: Name not valid. (can contain only alphanumeric characters, spaces or ')"
            );
        }
    }

    /// Reads up to ten numbers, one per prompt; an empty line finishes.
    async fn read_numbers(&mut self) -> Option<String> {
        let mut numbers: Vec<String> = Vec::new();
        while numbers.len() < MAX_NUMBERS {
            let prompt = format!(
                "Enter number n.{} or press enter to continue: ",
                numbers.len() + 1
            );
            let num = self.read_line(&prompt).await?;
            if num.is_empty() {
                break;
            }
            if validate::check_number(&num) {
                numbers.push(num);
            } else {
                println!(
                    "ERROR: Number not valid. (can contain only numeric characters or +)"
                );
            }
        }
        Some(numbers.join(","))
    }

    async fn read_username(&mut self) -> Option<String> {
        loop {
            let username = self.read_line("Enter Username: ").await?;
            if validate::check_username(&username) {
                return Some(username);
            }
            println!(
                "ERROR: Username not valid. (can contain only alphanumeric characters, - or _)"
            );
        }
    }

    /// Reads a password and returns its hash; the cleartext never leaves
    /// this function.
    async fn read_password_hash(&mut self) -> Option<String> {
        loop {
            let password = self.read_line("Enter Password: ").await?;
            if !validate::check_password(&password) {
                println!(
                    "ERROR: Password not valid. (has to be at least {} chars, alphanumeric or punctuation)",
                    validate::MIN_PASSWORD_LEN
                );
                continue;
            }
            match auth::hash_password(&password) {
                Ok(hash) => return Some(hash),
                Err(e) => {
                    error!("password hashing failed: {e:#}");
                    return None;
                },
            }
        }
    }
}

fn print_store(title: &str, store: &SortedStore) {
    println!("\n- - - - - {title} - - - - -");
    println!(
        "Size = {},   Capacity = {}\n",
        store.len(),
        store.capacity()
    );
    for (i, record) in store.iter().enumerate() {
        println!("[{i}] Key: \"{}\",  Value: \"{}\"", record.key, record.value);
    }
    println!();
}

/// Runs the console on stdin until a shutdown command, a shutdown request
/// from elsewhere, or stdin closing.
pub async fn run(
    stores: Arc<Stores>,
    journal: JournalHandle,
    cfg: Arc<Config>,
    shutdown: CancellationToken,
) {
    run_with_input(tokio::io::stdin(), stores, journal, cfg, shutdown).await;
}

/// The command loop itself, over any line-oriented input. Tests drive it
/// with a scripted reader in place of stdin.
pub async fn run_with_input<R: AsyncRead + Unpin>(
    input: R,
    stores: Arc<Stores>,
    journal: JournalHandle,
    cfg: Arc<Config>,
    shutdown: CancellationToken,
) {
    let mut console = Console::new(input, shutdown.clone());
    println!("Server console initialized.");

    loop {
        let Some(command) = console.read_line(MENU).await else {
            return;
        };
        match command.as_str() {
            "0" => {
                shutdown.cancel();
                return;
            },
            "1" => print_store("Main store", &*stores.main.read().await),
            "2" => {
                if add_main_record(&mut console, &stores, &journal, &shutdown)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            "3" => {
                if remove_main_record(&mut console, &stores, &journal, &shutdown)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            "4" => print_store("Privileged users", &stores.users.read().await.privileged),
            "5" => {
                if upsert_user(&mut console, &stores, &cfg, &shutdown, UserClass::Privileged)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            "6" => {
                if remove_user(&mut console, &stores, &cfg, &shutdown, UserClass::Privileged)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            "7" => print_store("Normal users", &stores.users.read().await.normal),
            "8" => {
                if upsert_user(&mut console, &stores, &cfg, &shutdown, UserClass::Normal)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            "9" => {
                if remove_user(&mut console, &stores, &cfg, &shutdown, UserClass::Normal)
                    .await
                    .is_none()
                {
                    return;
                }
            },
            _ => println!("{INVALID_COMMAND}"),
        }
    }
}

/// Waits out a journal submission made under the writer guard. A failure is
/// fatal I/O: log it and ask for a safe shutdown, leaving the journal file
/// in place for recovery.
async fn settle_journal(
    pending: anyhow::Result<oneshot::Receiver<anyhow::Result<()>>>,
    shutdown: &CancellationToken,
) {
    let durable = match pending {
        Ok(rx) => match rx.await {
            Ok(res) => res,
            Err(_) => Err(anyhow!("journal writer dropped the request")),
        },
        Err(e) => Err(e),
    };
    if let Err(e) = durable {
        error!("journal append failed: {e:#}");
        shutdown.cancel();
    }
}

async fn add_main_record<R: AsyncRead + Unpin>(
    console: &mut Console<R>,
    stores: &Stores,
    journal: &JournalHandle,
    shutdown: &CancellationToken,
) -> Option<()> {
    let name = console.read_name().await?;
    let numbers = console.read_numbers().await?;
    let record = Record::new(name, numbers);

    // Submitted while the guard is held, exactly like a session ADD, so the
    // journal's order matches the order mutations land in the store.
    let pending = {
        let mut main = stores.main.write().await;
        match main.insert_or_replace(record.clone()) {
            Ok(_) => Some(journal.submit(JournalOp::Add(record)).await),
            Err(_) => None,
        }
    };
    match pending {
        Some(pending) => {
            settle_journal(pending, shutdown).await;
            println!("Main record added.");
        },
        None => println!("Maximum size reached, can't add the record."),
    }
    Some(())
}

async fn remove_main_record<R: AsyncRead + Unpin>(
    console: &mut Console<R>,
    stores: &Stores,
    journal: &JournalHandle,
    shutdown: &CancellationToken,
) -> Option<()> {
    let name = console.read_name().await?;
    let pending = {
        let mut main = stores.main.write().await;
        match main.remove(&name) {
            Some(_) => Some(journal.submit(JournalOp::Del(name.clone())).await),
            None => None,
        }
    };
    match pending {
        Some(pending) => {
            settle_journal(pending, shutdown).await;
            println!("The main record with name '{name}' has been removed.");
        },
        None => println!("There isn't a main record with name '{name}'."),
    }
    Some(())
}

async fn export_or_shutdown(
    store: &SortedStore,
    path: &std::path::Path,
    shutdown: &CancellationToken,
) {
    if let Err(e) = snapshot::export(store, path).await {
        error!("snapshot export failed: {e:#}");
        shutdown.cancel();
    }
}

async fn upsert_user<R: AsyncRead + Unpin>(
    console: &mut Console<R>,
    stores: &Stores,
    cfg: &Config,
    shutdown: &CancellationToken,
    class: UserClass,
) -> Option<()> {
    let username = console.read_username().await?;
    let hash = console.read_password_hash().await?;
    let record = Record::new(username.clone(), hash);

    let mut users = stores.users.write().await;
    match users.upsert(class, record) {
        Ok(moved) => {
            match (class, moved) {
                (UserClass::Privileged, true) => {
                    println!(
                        "The user '{username}' was a normal user, and has been promoted to privileged."
                    );
                    export_or_shutdown(&users.normal, &cfg.norm_users_db_path(), shutdown)
                        .await;
                },
                (UserClass::Normal, true) => {
                    println!(
                        "The user '{username}' was a privileged user, and has been demoted to normal."
                    );
                    export_or_shutdown(
                        &users.privileged,
                        &cfg.priv_users_db_path(),
                        shutdown,
                    )
                    .await;
                },
                (UserClass::Privileged, false) => {
                    println!("The user '{username}' has been added to the privileged users.");
                },
                (UserClass::Normal, false) => {
                    println!("The user '{username}' has been added to the normal users.");
                },
            }
            let (store, path) = match class {
                UserClass::Privileged => (&users.privileged, cfg.priv_users_db_path()),
                UserClass::Normal => (&users.normal, cfg.norm_users_db_path()),
            };
            export_or_shutdown(store, &path, shutdown).await;
        },
        Err(e) => println!("Can't add the user: {e}"),
    }
    Some(())
}

async fn remove_user<R: AsyncRead + Unpin>(
    console: &mut Console<R>,
    stores: &Stores,
    cfg: &Config,
    shutdown: &CancellationToken,
    class: UserClass,
) -> Option<()> {
    let username = console.read_username().await?;
    let mut users = stores.users.write().await;
    let (label, path) = match class {
        UserClass::Privileged => ("privileged", cfg.priv_users_db_path()),
        UserClass::Normal => ("normal", cfg.norm_users_db_path()),
    };
    if users.remove(class, &username) {
        println!("The user '{username}' has been removed from the {label} users.");
    } else {
        println!("The user '{username}' is not a {label} user.");
    }
    let store = match class {
        UserClass::Privileged => &users.privileged,
        UserClass::Normal => &users.normal,
    };
    export_or_shutdown(store, &path, shutdown).await;
    Some(())
}
