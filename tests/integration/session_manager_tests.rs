//! Integration tests for the session lifecycle over real git worktrees.

use codepunk_rollback::config::GitSessionOptions;
use codepunk_rollback::models::session::SessionState;
use codepunk_rollback::session::{SessionEndAction, SessionStateStore};
use codepunk_rollback::AppError;
use tokio_util::sync::CancellationToken;

use super::test_helpers as helpers;

fn repo_scratch() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("ws");
    std::fs::create_dir_all(&workspace).expect("workspace");
    helpers::init_repo(&workspace);
    (dir, workspace)
}

// ── Begin ────────────────────────────────────────────────────

#[tokio::test]
async fn begin_creates_branch_worktree_and_override() {
    if helpers::skip_without_git("begin_creates_branch_worktree_and_override") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, workdir) = helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");

    assert_eq!(session.state, SessionState::Active);
    assert!(session.branch_name.starts_with("ai/session/"));
    assert!(session.worktree_path.is_dir());
    assert!(session.worktree_path.join("README.md").exists());
    assert_eq!(workdir.get(), Some(session.worktree_path.clone()));
    assert!(helpers::branches(&workspace).contains(&session.branch_name));
}

#[tokio::test]
async fn begin_is_idempotent_while_a_session_is_live() {
    if helpers::skip_without_git("begin_is_idempotent_while_a_session_is_live") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let first = manager.begin_session(&cancel).await.expect("first");
    let second = manager.begin_session(&cancel).await.expect("second");
    assert_eq!(first.id, second.id);
    assert_eq!(helpers::branches(&workspace).len(), 2); // primary + one session
}

#[tokio::test]
async fn begin_outside_a_repository_is_rejected() {
    if helpers::skip_without_git("begin_outside_a_repository_is_rejected") {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("plain");
    std::fs::create_dir_all(&workspace).expect("workspace");
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);

    let err = manager
        .begin_session(&CancellationToken::new())
        .await
        .expect_err("not a repo");
    assert!(matches!(err, AppError::Session(_)));
}

#[tokio::test]
async fn begin_on_a_disabled_manager_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("ws");
    std::fs::create_dir_all(&workspace).expect("workspace");
    let options = GitSessionOptions {
        enabled: false,
        ..helpers::session_options(dir.path())
    };
    let (manager, _workdir) = helpers::manager_with(options, &workspace);

    let err = manager
        .begin_session(&CancellationToken::new())
        .await
        .expect_err("disabled");
    assert!(matches!(err, AppError::Session(_)));
}

// ── Commit per tool call ─────────────────────────────────────

#[tokio::test]
async fn commits_are_recorded_in_call_order() {
    if helpers::skip_without_git("commits_are_recorded_in_call_order") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");

    std::fs::write(session.worktree_path.join("a.txt"), "1").expect("write a");
    manager
        .commit_tool_call("write_file", "a.txt", &cancel)
        .await
        .expect("first commit");

    std::fs::write(session.worktree_path.join("b.txt"), "2").expect("write b");
    manager
        .commit_tool_call("shell", "touch", &cancel)
        .await
        .expect("second commit");

    let current = manager.current_session().await.expect("session");
    assert_eq!(current.state, SessionState::Active);
    assert_eq!(current.committed_tool_calls.len(), 2);
    assert_eq!(current.committed_tool_calls[0].tool_name, "write_file");
    assert_eq!(current.committed_tool_calls[0].summary, "a.txt");
    assert_eq!(current.committed_tool_calls[1].tool_name, "shell");
    assert!(current.committed_tool_calls[0].commit_hash
        != current.committed_tool_calls[1].commit_hash);

    // One commit per call, on top of the seed commit.
    let log = helpers::git(&current.worktree_path, &["log", "--oneline"]);
    assert_eq!(log.lines().count(), 3);
}

#[tokio::test]
async fn commit_without_a_session_is_an_error() {
    if helpers::skip_without_git("commit_without_a_session_is_an_error") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);

    let err = manager
        .commit_tool_call("write_file", "a.txt", &CancellationToken::new())
        .await
        .expect_err("no session");
    assert!(matches!(err, AppError::Session(_)));
}

#[tokio::test]
async fn commit_with_no_changes_still_lands() {
    if helpers::skip_without_git("commit_with_no_changes_still_lands") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    manager.begin_session(&cancel).await.expect("begin");
    let record = manager
        .commit_tool_call("shell", "cargo check", &cancel)
        .await
        .expect("empty commit");
    assert!(!record.commit_hash.is_empty());
}

// ── Accept / discard ─────────────────────────────────────────

#[tokio::test]
async fn accept_fast_forwards_the_primary_checkout() {
    if helpers::skip_without_git("accept_fast_forwards_the_primary_checkout") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, workdir) = helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");
    std::fs::write(session.worktree_path.join("feature.txt"), "done").expect("write");
    manager
        .commit_tool_call("write_file", "feature.txt", &cancel)
        .await
        .expect("commit");

    let ended = manager
        .end_session(SessionEndAction::Accept, &cancel)
        .await
        .expect("accept");

    assert_eq!(ended.state, SessionState::Ended);
    assert!(workspace.join("feature.txt").exists());
    assert!(!session.worktree_path.exists());
    assert!(!helpers::branches(&workspace).contains(&session.branch_name));
    assert!(workdir.get().is_none());

    // The durable record is cleared after a clean end.
    let store = SessionStateStore::new(&dir.path().join("state"), &workspace).expect("store");
    assert!(store.load().expect("load").is_none());
}

#[tokio::test]
async fn discard_leaves_the_primary_checkout_untouched() {
    if helpers::skip_without_git("discard_leaves_the_primary_checkout_untouched") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");
    std::fs::write(session.worktree_path.join("abandoned.txt"), "nope").expect("write");
    manager
        .commit_tool_call("write_file", "abandoned.txt", &cancel)
        .await
        .expect("commit");

    manager
        .end_session(SessionEndAction::Discard, &cancel)
        .await
        .expect("discard");

    assert!(!workspace.join("abandoned.txt").exists());
    assert!(!session.worktree_path.exists());
    assert!(!helpers::branches(&workspace).contains(&session.branch_name));
}

#[tokio::test]
async fn accept_with_a_diverged_primary_fails_and_stays_active() {
    if helpers::skip_without_git("accept_with_a_diverged_primary_fails_and_stays_active") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");
    std::fs::write(session.worktree_path.join("feature.txt"), "done").expect("write");
    manager
        .commit_tool_call("write_file", "feature.txt", &cancel)
        .await
        .expect("commit");

    // The user commits to the primary branch behind the session's back.
    std::fs::write(workspace.join("user.txt"), "user work").expect("user write");
    helpers::git(&workspace, &["add", "-A"]);
    helpers::git(&workspace, &["commit", "-m", "user commit"]);

    let err = manager
        .end_session(SessionEndAction::Accept, &cancel)
        .await
        .expect_err("diverged");
    assert!(matches!(err, AppError::Git(_)));

    let current = manager.current_session().await.expect("session");
    assert_eq!(current.state, SessionState::Active);
    assert!(current.worktree_path.exists());
}

#[tokio::test]
async fn end_without_a_session_is_an_error() {
    if helpers::skip_without_git("end_without_a_session_is_an_error") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);

    let err = manager
        .end_session(SessionEndAction::Discard, &CancellationToken::new())
        .await
        .expect_err("nothing to end");
    assert!(matches!(err, AppError::Session(_)));
}

// ── Failure ──────────────────────────────────────────────────

#[tokio::test]
async fn mark_failed_records_the_reason_and_reverts() {
    if helpers::skip_without_git("mark_failed_records_the_reason_and_reverts") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, workdir) = helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");
    let failed = manager
        .mark_failed("dispatcher exploded", &cancel)
        .await
        .expect("mark failed")
        .expect("a session was live");

    assert_eq!(failed.state, SessionState::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("dispatcher exploded"));
    assert!(!session.worktree_path.exists());
    assert!(!helpers::branches(&workspace).contains(&session.branch_name));
    assert!(workdir.get().is_none());
}

#[tokio::test]
async fn keep_failed_session_branches_retains_the_branch() {
    if helpers::skip_without_git("keep_failed_session_branches_retains_the_branch") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let options = GitSessionOptions {
        keep_failed_session_branches: true,
        ..helpers::session_options(dir.path())
    };
    let (manager, _workdir) = helpers::manager_with(options, &workspace);
    let cancel = CancellationToken::new();

    let session = manager.begin_session(&cancel).await.expect("begin");
    manager
        .mark_failed("boom", &cancel)
        .await
        .expect("mark failed");

    assert!(!session.worktree_path.exists());
    assert!(helpers::branches(&workspace).contains(&session.branch_name));
}

#[tokio::test]
async fn mark_failed_without_a_session_is_a_no_op() {
    if helpers::skip_without_git("mark_failed_without_a_session_is_a_no_op") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);

    let outcome = manager
        .mark_failed("nothing running", &CancellationToken::new())
        .await
        .expect("no-op");
    assert!(outcome.is_none());
}

// ── A fresh session after a terminal one ─────────────────────

#[tokio::test]
async fn a_new_session_can_start_after_discard() {
    if helpers::skip_without_git("a_new_session_can_start_after_discard") {
        return;
    }
    let (dir, workspace) = repo_scratch();
    let (manager, _workdir) =
        helpers::manager_with(helpers::session_options(dir.path()), &workspace);
    let cancel = CancellationToken::new();

    let first = manager.begin_session(&cancel).await.expect("first");
    manager
        .end_session(SessionEndAction::Discard, &cancel)
        .await
        .expect("discard");

    let second = manager.begin_session(&cancel).await.expect("second");
    assert_ne!(first.id, second.id);
    assert_eq!(second.state, SessionState::Active);
}
