//! End-to-end tests driving the terminal through chat messages.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use vterm::collaborators::{ChannelConsole, Collaborators, DirectMessenger, Invocation, PackageService};
use vterm::config::HashCost;
use vterm::{
    CommandContext, Error, ManualClock, Prompt, Response, SqlBackend, Stores, Terminal, TerminalConfig,
};

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vterm=info".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

const ADMIN: &str = "900";

fn config() -> TerminalConfig {
    let mut config = TerminalConfig::default();
    config.settings.hash_cost = HashCost {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    };
    config.admins = vec![ADMIN.to_string()];
    config
}

async fn terminal_with(collaborators: Collaborators, clock: Arc<ManualClock>) -> Terminal {
    let backend = Arc::new(SqlBackend::in_memory().await.unwrap());
    Terminal::with_clock(Stores::shared(backend), config(), collaborators, clock)
}

async fn terminal() -> Terminal {
    terminal_with(Collaborators::default(), Arc::new(ManualClock::default())).await
}

async fn signup(terminal: &Terminal, ctx: &CommandContext, username: &str) {
    let response = terminal.handle_message(ctx, "register").await.unwrap();
    assert_eq!(response.prompt, Some(Prompt::Register));
    let response = terminal.submit_registration(ctx, username, "secret1").await;
    assert!(response.success, "{}", response.text());

    let response = terminal.submit_login(ctx, username, "secret1").await;
    assert!(response.success, "{}", response.text());
}

async fn run(terminal: &Terminal, ctx: &CommandContext, content: &str) -> Response {
    terminal
        .handle_message(ctx, content)
        .await
        .unwrap_or_else(|| panic!("'{content}' was not treated as a command"))
}

fn elevation(response: &Response) -> uuid::Uuid {
    match &response.prompt {
        Some(Prompt::Elevation(pending)) => pending.id,
        other => panic!("expected elevation prompt, got {other:?}: {}", response.text()),
    }
}

#[tokio::test]
async fn test_filesystem_walkthrough() {
    let terminal = terminal().await;
    let alice = CommandContext::new("100");
    signup(&terminal, &alice, "alice").await;

    let response = run(&terminal, &alice, "pwd").await;
    assert!(response.text().contains("/home/alice"));

    let response = run(&terminal, &alice, "ls").await;
    assert!(response.text().contains("documents/"));
    assert!(!response.text().contains(".config"));
    assert!(run(&terminal, &alice, "ls -a").await.text().contains(".config/"));

    let response = run(&terminal, &alice, "mkdir projects").await;
    assert!(response.text().contains("Directory created: /home/alice/projects"));

    let response = run(&terminal, &alice, "echo hello world > projects/notes.txt").await;
    assert!(response.success, "{}", response.text());
    assert!(run(&terminal, &alice, "cat projects/notes.txt").await.text().contains("hello world"));

    let response = run(&terminal, &alice, "mv projects documents").await;
    assert!(!response.success);
    assert!(response.text().contains("Already exists"));

    let response = run(&terminal, &alice, "mv projects archive").await;
    assert!(response.text().contains("Moved: /home/alice/projects → /home/alice/archive"));
    assert!(run(&terminal, &alice, "cat archive/notes.txt").await.text().contains("hello world"));
    assert!(!run(&terminal, &alice, "cat projects/notes.txt").await.success);

    let response = run(&terminal, &alice, "chmod 700 archive").await;
    assert!(response.text().contains("Changed permissions of '/home/alice/archive' to rwx------"));

    let response = run(&terminal, &alice, "cd archive").await;
    assert!(response.text().contains("Changed directory to: /home/alice/archive"));
    let response = run(&terminal, &alice, "grep hello").await;
    assert!(response.text().contains("notes.txt"));
    run(&terminal, &alice, "cd ..").await;

    let response = run(&terminal, &alice, "rm archive").await;
    assert!(response.text().contains("Directory not empty"));
    assert!(run(&terminal, &alice, "rm -r archive").await.success);
    assert!(!run(&terminal, &alice, "ls archive").await.success);

    let response = run(&terminal, &alice, "rm -r /home").await;
    assert!(response.text().contains("Cannot remove protected directory: /home"));

    let response = run(&terminal, &alice, "tree /home").await;
    assert!(response.text().contains("alice/"));
    assert!(response.text().contains("documents/"));
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let terminal = terminal().await;
    let alice = CommandContext::new("100");
    let bob = CommandContext::new("200");
    signup(&terminal, &alice, "alice").await;
    signup(&terminal, &bob, "bob").await;

    run(&terminal, &alice, "echo private > secret.txt").await;

    let response = run(&terminal, &bob, "cat /home/alice/secret.txt").await;
    assert!(!response.success);
    assert!(response.text().contains("No such file or directory"));
    assert!(!run(&terminal, &bob, "ls /home/alice").await.success);

    let response = run(&terminal, &bob, "find / -name secret").await;
    assert!(response.text().contains("No files found"));
}

#[tokio::test]
async fn test_working_directory_follows_mv_and_rm() {
    let terminal = terminal().await;
    let alice = CommandContext::new("100");
    signup(&terminal, &alice, "alice").await;

    run(&terminal, &alice, "mkdir archive").await;
    run(&terminal, &alice, "mkdir archive/2024").await;
    run(&terminal, &alice, "cd archive/2024").await;

    let response = run(&terminal, &alice, "mv /home/alice/archive /home/alice/old").await;
    assert!(response.success, "{}", response.text());
    assert!(run(&terminal, &alice, "pwd").await.text().contains("/home/alice/old/2024"));
    assert!(run(&terminal, &alice, "ls").await.success);

    let response = run(&terminal, &alice, "rm -r /home/alice/old").await;
    assert!(response.success, "{}", response.text());
    let response = run(&terminal, &alice, "pwd").await;
    assert!(response.text().contains("/home/alice"));
    assert!(!response.text().contains("old"));
    assert!(run(&terminal, &alice, "ls").await.success);

    // Unrelated moves leave the working directory alone
    run(&terminal, &alice, "cd documents").await;
    run(&terminal, &alice, "mkdir /home/alice/tmp").await;
    run(&terminal, &alice, "mv /home/alice/tmp /home/alice/tmp2").await;
    assert!(run(&terminal, &alice, "pwd").await.text().contains("/home/alice/documents"));
}

#[tokio::test]
async fn test_registration_rules() {
    let terminal = terminal().await;
    let ctx = CommandContext::new("100");

    let response = terminal.submit_registration(&ctx, "al", "secret1").await;
    assert!(response.text().contains("Invalid username"));
    let response = terminal.submit_registration(&ctx, "alice", "short").await;
    assert!(response.text().contains("at least 6 characters"));

    signup(&terminal, &ctx, "alice").await;

    let response = run(&terminal, &ctx, "register").await;
    assert!(response.text().contains("You already have an account"));

    let other = CommandContext::new("200");
    let response = terminal.submit_registration(&other, "alice", "secret1").await;
    assert!(response.text().contains("Username 'alice' is already taken"));
}

#[tokio::test]
async fn test_login_lockout() {
    let clock = Arc::new(ManualClock::default());
    let terminal = terminal_with(Collaborators::default(), clock.clone()).await;
    let ctx = CommandContext::new("100");
    assert!(terminal.submit_registration(&ctx, "bob", "secret1").await.success);

    let response = terminal.submit_login(&ctx, "robert", "secret1").await;
    assert!(response.text().contains("registered as 'bob'"));

    let response = terminal.submit_login(&ctx, "bob", "wrong-one").await;
    assert!(response.text().contains("Incorrect password. 4 attempts remaining."));
    for _ in 0..3 {
        assert!(!terminal.submit_login(&ctx, "bob", "wrong-one").await.success);
    }
    let response = terminal.submit_login(&ctx, "bob", "wrong-one").await;
    assert!(response.text().contains("Account locked. Try again in 15 minutes."));

    let response = terminal.submit_login(&ctx, "bob", "secret1").await;
    assert!(response.text().contains("Account locked"));

    clock.advance(Duration::minutes(10));
    let response = terminal.submit_login(&ctx, "bob", "secret1").await;
    assert!(response.text().contains("Try again in 5 minutes."));

    clock.advance(Duration::minutes(6));
    let response = terminal.submit_login(&ctx, "bob", "secret1").await;
    assert!(response.success, "{}", response.text());
    assert!(response.text().contains("Welcome back, bob!"));
}

#[tokio::test]
async fn test_session_timeout_and_logout() {
    let clock = Arc::new(ManualClock::default());
    let terminal = terminal_with(Collaborators::default(), clock.clone()).await;
    let ctx = CommandContext::new("100");
    signup(&terminal, &ctx, "alice").await;

    clock.advance(Duration::minutes(61));
    let response = run(&terminal, &ctx, "pwd").await;
    assert!(response.text().contains("You must be logged in"));

    assert!(terminal.submit_login(&ctx, "alice", "secret1").await.success);
    let response = run(&terminal, &ctx, "logout").await;
    assert!(response.text().contains("Goodbye, alice!"));
    assert!(!terminal.sessions().is_logged_in("100").await);
}

#[tokio::test]
async fn test_password_change() {
    let terminal = terminal().await;
    let ctx = CommandContext::new("100");
    signup(&terminal, &ctx, "alice").await;

    let response = run(&terminal, &ctx, "passwd newsecret").await;
    assert_eq!(
        response.prompt,
        Some(Prompt::ChangePassword {
            new_password: Some("newsecret".to_string())
        })
    );

    let response = terminal.submit_password_change(&ctx, "nope-nope", "newsecret").await;
    assert!(response.text().contains("Incorrect password"));
    let response = terminal.submit_password_change(&ctx, "secret1", "newsecret").await;
    assert!(response.success);

    run(&terminal, &ctx, "logout").await;
    assert!(!terminal.submit_login(&ctx, "alice", "secret1").await.success);
    assert!(terminal.submit_login(&ctx, "alice", "newsecret").await.success);
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, message) = sent.last().expect("no message sent");
        message.split('`').nth(1).expect("no code in message").to_string()
    }
}

#[async_trait]
impl DirectMessenger for Outbox {
    async fn send(&self, identity: &str, message: &str) -> vterm::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((identity.to_string(), message.to_string()));
        Ok(())
    }
}

struct ClosedDms;

#[async_trait]
impl DirectMessenger for ClosedDms {
    async fn send(&self, _identity: &str, _message: &str) -> vterm::Result<()> {
        Err(Error::Collaborator("forbidden".to_string()))
    }
}

#[tokio::test]
async fn test_password_reset() {
    let outbox = Arc::new(Outbox::default());
    let collaborators = Collaborators::default().with_messenger(outbox.clone());
    let terminal = terminal_with(collaborators, Arc::new(ManualClock::default())).await;
    let ctx = CommandContext::new("100");
    assert!(terminal.submit_registration(&ctx, "alice", "secret1").await.success);

    let response = run(&terminal, &ctx, "resetpw").await;
    assert_eq!(response.prompt, Some(Prompt::ResetPassword));
    let code = outbox.last_code();
    assert_eq!(code.len(), 6);

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let response = terminal.submit_password_reset(&ctx, wrong, "brandnew").await;
    assert!(response.text().contains("Incorrect reset code. 2 attempts remaining."));

    let response = terminal.submit_password_reset(&ctx, &code, "brandnew").await;
    assert!(response.success, "{}", response.text());
    assert!(terminal.submit_login(&ctx, "alice", "brandnew").await.success);

    let response = terminal.submit_password_reset(&ctx, &code, "another1").await;
    assert!(response.text().contains("No reset request found"));
}

#[tokio::test]
async fn test_reset_code_attempts_exhausted() {
    let outbox = Arc::new(Outbox::default());
    let collaborators = Collaborators::default().with_messenger(outbox.clone());
    let terminal = terminal_with(collaborators, Arc::new(ManualClock::default())).await;
    let ctx = CommandContext::new("100");
    assert!(terminal.submit_registration(&ctx, "alice", "secret1").await.success);

    run(&terminal, &ctx, "resetpw").await;
    let code = outbox.last_code();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    assert!(!terminal.submit_password_reset(&ctx, wrong, "brandnew").await.success);
    assert!(!terminal.submit_password_reset(&ctx, wrong, "brandnew").await.success);
    let response = terminal.submit_password_reset(&ctx, wrong, "brandnew").await;
    assert!(response.text().contains("Too many failed attempts"));

    let response = terminal.submit_password_reset(&ctx, &code, "brandnew").await;
    assert!(response.text().contains("No reset request found"));
}

#[tokio::test]
async fn test_reset_without_dms() {
    let collaborators = Collaborators::default().with_messenger(Arc::new(ClosedDms));
    let terminal = terminal_with(collaborators, Arc::new(ManualClock::default())).await;
    let ctx = CommandContext::new("100");
    assert!(terminal.submit_registration(&ctx, "alice", "secret1").await.success);

    let response = run(&terminal, &ctx, "resetpw").await;
    assert!(!response.success);
    assert!(response.text().contains("Cannot send DM"));
}

#[derive(Default)]
struct Console {
    purges: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl ChannelConsole for Console {
    async fn purge(&self, channel_id: &str, limit: u32) -> vterm::Result<u32> {
        self.purges
            .lock()
            .unwrap()
            .push((channel_id.to_string(), limit));
        Ok(limit.min(7))
    }
}

struct Apt;

#[async_trait]
impl PackageService for Apt {
    async fn execute(&self, invocation: &Invocation) -> vterm::Result<String> {
        Ok(format!("installed {}", invocation.args.join(" ")))
    }
}

#[tokio::test]
async fn test_sudo_flow() {
    let console = Arc::new(Console::default());
    let collaborators = Collaborators::default()
        .with_console(console.clone())
        .with_packages(Arc::new(Apt));
    let clock = Arc::new(ManualClock::default());
    let terminal = terminal_with(collaborators, clock.clone()).await;

    let alice = CommandContext::new("100").in_channel("g1", "c1", "terminal");
    terminal
        .channels()
        .trust("c1", Some("g1"), Some("terminal"), ADMIN)
        .await
        .unwrap();
    signup(&terminal, &alice, "alice").await;

    let response = run(&terminal, &alice, "clear").await;
    assert!(response.text().contains("Use 'sudo clear'"));

    let response = run(&terminal, &alice, "sudo ls").await;
    assert!(response.text().contains("'ls' is not a sudo command"));

    let id = elevation(&run(&terminal, &alice, "sudo clear 50").await);
    let response = terminal.submit_sudo(&alice, id, "wrong-one").await;
    assert!(response.text().contains("Incorrect password"));

    let response = terminal.submit_sudo(&alice, id, "secret1").await;
    assert!(response.success, "{}", response.text());
    assert!(response.text().contains("Sudo command executed: clear"));
    assert!(response.text().contains("Cleared 7 message(s)"));
    assert_eq!(console.purges.lock().unwrap().as_slice(), &[("c1".to_string(), 50)]);

    let response = terminal.submit_sudo(&alice, id, "secret1").await;
    assert!(response.text().contains("No pending elevated command"));

    let id = elevation(&run(&terminal, &alice, "sudo apt install htop").await);
    clock.advance(Duration::seconds(121));
    let response = terminal.submit_sudo(&alice, id, "secret1").await;
    assert!(response.text().contains("Elevation request expired"));

    let id = elevation(&run(&terminal, &alice, "sudo apt install htop").await);
    let response = terminal.submit_sudo(&alice, id, "secret1").await;
    assert!(response.text().contains("installed install htop"));
}

#[tokio::test]
async fn test_root_administration() {
    let terminal = terminal().await;
    let admin = CommandContext::new(ADMIN);
    let alice = CommandContext::new("100");
    signup(&terminal, &admin, "boss").await;
    signup(&terminal, &alice, "alice").await;

    let response = run(&terminal, &alice, "root users").await;
    assert!(response.text().contains("You do not have root privileges"));

    let response = run(&terminal, &alice, "users").await;
    assert!(response.text().contains("Use 'root users'"));

    let id = elevation(&run(&terminal, &admin, "root users").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("Root command executed: users"));
    assert!(response.text().contains("alice"));
    assert!(response.text().contains("boss"));

    let id = elevation(&run(&terminal, &admin, "root usermod alice role admin").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("User 'alice' role changed to 'admin'"));
    assert!(run(&terminal, &alice, "whoami").await.text().contains("Role: admin"));

    let id = elevation(&run(&terminal, &admin, "root userdel 900").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("Cannot remove your own admin rights"));

    let id = elevation(&run(&terminal, &admin, "root passwd alice resetbyadmin").await);
    assert!(terminal.submit_root(&admin, id, "secret1").await.success);
    run(&terminal, &alice, "logout").await;
    assert!(terminal.submit_login(&alice, "alice", "resetbyadmin").await.success);

    let id = elevation(&run(&terminal, &admin, "root logs 5").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("ACTION"));
    assert!(response.text().contains("login"));

    let id = elevation(&run(&terminal, &admin, "root kick @someone").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("Moderation system not loaded"));
}

#[tokio::test]
async fn test_elevation_needs_live_session() {
    let terminal = terminal().await;
    let admin = CommandContext::new(ADMIN);
    signup(&terminal, &admin, "boss").await;

    let id = elevation(&run(&terminal, &admin, "root users").await);
    run(&terminal, &admin, "logout").await;
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(!response.success);
    assert!(response.text().contains("You must be logged in"));

    assert!(terminal.submit_login(&admin, "boss", "secret1").await.success);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("No pending elevated command"));
}

#[tokio::test]
async fn test_channel_trust() {
    let terminal = terminal().await;
    signup(&terminal, &CommandContext::new(ADMIN), "boss").await;
    signup(&terminal, &CommandContext::new("100"), "alice").await;
    let admin = CommandContext::new(ADMIN).in_channel("g1", "c1", "terminal");
    let alice = CommandContext::new("100").in_channel("g1", "c1", "terminal");

    let response = run(&terminal, &alice, "ls").await;
    assert!(response.text().contains("This channel is not trusted"));
    assert!(terminal.handle_message(&alice, "just chatting").await.is_none());

    let response = run(&terminal, &alice, "root channel trust").await;
    assert!(response.text().contains("You do not have root privileges"));

    let id = elevation(&run(&terminal, &admin, "root channel trust").await);
    assert!(terminal.submit_root(&admin, id, "secret1").await.success);
    assert!(run(&terminal, &alice, "ls").await.success);

    let id = elevation(&run(&terminal, &admin, "root channel list").await);
    let response = terminal.submit_root(&admin, id, "secret1").await;
    assert!(response.text().contains("<#c1> (terminal)"));

    let id = elevation(&run(&terminal, &admin, "root channel untrust").await);
    assert!(terminal.submit_root(&admin, id, "secret1").await.success);
    assert!(!run(&terminal, &alice, "ls").await.success);
}

#[tokio::test]
async fn test_long_output_is_chunked() {
    let terminal = terminal().await;
    let ctx = CommandContext::new("100");
    signup(&terminal, &ctx, "alice").await;

    let long = "x".repeat(4500);
    let response = run(&terminal, &ctx, &format!("echo {long}")).await;
    assert_eq!(response.messages.len(), 3);
    assert!(response.messages.iter().all(|m| m.chars().count() <= 1900));
    assert!(response.text().contains(&long));
}

#[tokio::test]
async fn test_separate_stores() {
    let stores = Stores {
        filesystem: Arc::new(SqlBackend::in_memory().await.unwrap()),
        accounts: Arc::new(SqlBackend::in_memory().await.unwrap()),
        channels: Arc::new(SqlBackend::in_memory().await.unwrap()),
    };
    let terminal = Terminal::new(stores, config(), Collaborators::default());
    let ctx = CommandContext::new("100");
    signup(&terminal, &ctx, "alice").await;

    assert!(terminal.filesystem().is_directory("100", "/home/alice").await.unwrap());
    assert!(terminal.vault().get_account("100").await.unwrap().is_some());
}

#[tokio::test]
async fn test_persistence_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("terminal.db");
    let db = db.to_str().unwrap().to_string();
    let ctx = CommandContext::new("100");

    {
        let backend = Arc::new(SqlBackend::sqlite(db.clone()).await.unwrap());
        let terminal = Terminal::new(Stores::shared(backend.clone()), config(), Collaborators::default());
        signup(&terminal, &ctx, "alice").await;
        run(&terminal, &ctx, "echo kept > keep.txt").await;
        backend.close().await;
    }

    let backend = Arc::new(SqlBackend::sqlite(db).await.unwrap());
    let terminal = Terminal::new(Stores::shared(backend), config(), Collaborators::default());
    assert!(!terminal.sessions().is_logged_in("100").await);
    assert!(terminal.submit_login(&ctx, "alice", "secret1").await.success);
    assert!(run(&terminal, &ctx, "cat keep.txt").await.text().contains("kept"));
}
