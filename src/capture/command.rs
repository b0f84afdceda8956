// sitecopy/src/capture/command.rs
use crate::config::{FilesConfig, RemoteDatabaseConfig};
use crate::utils::shell::quote;

const MASK: &str = "'*****'";
const PIPEFAIL_PREFIX: &str = "(set -o pipefail) 2>/dev/null && set -o pipefail; ";

#[derive(Debug, Clone)]
struct Token {
    text: String,
    display: String,
}

/// A shell command line for the remote host. Literal parts are written by
/// this crate; every configured value goes through [`quote`] before it is
/// joined in, so config values can never change the command's structure.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    tokens: Vec<Token>,
    pipefail: bool,
}

impl RemoteCommand {
    pub fn new(program: &str) -> Self {
        RemoteCommand {
            tokens: Vec::new(),
            pipefail: false,
        }
        .literal(program)
    }

    /// Appends text exactly as written.
    pub fn literal(mut self, text: &str) -> Self {
        self.tokens.push(Token {
            text: text.to_string(),
            display: text.to_string(),
        });
        self
    }

    /// Appends a quoted value as its own word.
    pub fn value(self, value: &str) -> Self {
        self.flag_value("", value)
    }

    /// Appends `<flag><quoted value>` as one word, e.g. `-u'root'`.
    pub fn flag_value(mut self, flag: &str, value: &str) -> Self {
        let word = format!("{}{}", flag, quote(value));
        self.tokens.push(Token {
            display: word.clone(),
            text: word,
        });
        self
    }

    /// Like [`flag_value`](Self::flag_value) but masked in [`display`](Self::display).
    pub fn secret(mut self, flag: &str, value: &str) -> Self {
        self.tokens.push(Token {
            text: format!("{}{}", flag, quote(value)),
            display: format!("{}{}", flag, MASK),
        });
        self
    }

    pub fn pipe_to(self, program: &str) -> Self {
        let mut cmd = self.literal("|").literal(program);
        cmd.pipefail = true;
        cmd
    }

    pub fn redirect_to(self, path: &str) -> Self {
        self.literal(">").value(path)
    }

    /// The command line sent to the remote shell.
    pub fn render(&self) -> String {
        self.join(|t| &t.text)
    }

    /// The command line with secrets masked, for logs.
    pub fn display(&self) -> String {
        self.join(|t| &t.display)
    }

    fn join<F>(&self, pick: F) -> String
    where
        F: Fn(&Token) -> &String,
    {
        let line = self
            .tokens
            .iter()
            .map(|t| pick(t).as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if self.pipefail {
            format!("{}{}", PIPEFAIL_PREFIX, line)
        } else {
            line
        }
    }
}

/// `tar czf <archive> -C <root> --exclude=<folder>... .`
pub fn archive_files_command(files: &FilesConfig, archive_path: &str) -> RemoteCommand {
    let mut cmd = RemoteCommand::new("tar")
        .literal("czf")
        .value(archive_path)
        .literal("-C")
        .value(&files.remote_root);
    for folder in &files.excluded_folders {
        cmd = cmd.flag_value("--exclude=", folder);
    }
    cmd.literal(".")
}

fn mysqldump_base(db: &RemoteDatabaseConfig) -> RemoteCommand {
    let cmd = RemoteCommand::new("mysqldump")
        .flag_value("-u", &db.user)
        .flag_value("-h", &db.host)
        .literal(&format!("-P{}", db.port));
    match &db.password {
        Some(password) => cmd.secret("-p", password),
        None => cmd,
    }
}

/// Schema-only dump piped through gzip into `target_path`.
pub fn schema_dump_command(db: &RemoteDatabaseConfig, target_path: &str) -> RemoteCommand {
    mysqldump_base(db)
        .literal("--no-data")
        .value(&db.name)
        .pipe_to("gzip")
        .redirect_to(target_path)
}

/// Full data dump, minus excluded tables, piped through gzip into `target_path`.
pub fn data_dump_command(db: &RemoteDatabaseConfig, target_path: &str) -> RemoteCommand {
    let mut cmd = mysqldump_base(db);
    for table in &db.excluded_tables {
        cmd = cmd.flag_value("--ignore-table=", &format!("{}.{}", db.name, table));
    }
    cmd.value(&db.name).pipe_to("gzip").redirect_to(target_path)
}

/// `rm -f <path>...`
pub fn remove_files_command<'a, I>(paths: I) -> RemoteCommand
where
    I: IntoIterator<Item = &'a str>,
{
    paths
        .into_iter()
        .fold(RemoteCommand::new("rm").literal("-f"), |cmd, path| cmd.value(path))
}
