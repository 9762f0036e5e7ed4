mod helpers;

use gitguard::checkpoint::CheckpointManager;
use gitguard::git::parser::{parse_ref_list, parse_status_porcelain_v2};
use gitguard::ledger::RepoLock;
use gitguard::{Guard, GuardError, Outcome, Plan, Repository, RiskLevel};
use helpers::{Scripted, create_commit, create_test_repo, git, head, test_config};
use std::fs;

/// Test parsing completely empty git output
#[test]
fn test_parse_empty_outputs() {
    assert!(parse_status_porcelain_v2("").unwrap().is_empty());
    assert!(parse_ref_list("").unwrap().is_empty());
}

/// Test parsing malformed git status output
#[test]
fn test_parse_malformed_status() {
    let result = parse_status_porcelain_v2("1 M.").unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_concurrent_operation_fails_fast() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    let before = head(&repo_path);
    let guard = Guard::open(Repository::new(&repo_path), &test_config(temp.path())).unwrap();

    let held = RepoLock::acquire(guard.control_dir()).unwrap();

    let plan = Plan::new("status", RiskLevel::Safe, ["git status"]).unwrap();
    assert!(matches!(
        guard.run(&plan, &mut Scripted::silent()),
        Err(GuardError::ConcurrentOperation(_))
    ));
    assert!(matches!(guard.checkpoint(), Err(GuardError::ConcurrentOperation(_))));
    assert!(matches!(guard.rollback(), Err(GuardError::ConcurrentOperation(_))));
    assert!(matches!(
        guard.restore("gitguard-backup-20240101_000000"),
        Err(GuardError::ConcurrentOperation(_))
    ));

    // Read-only queries do not need the lock
    assert!(guard.list_checkpoints().unwrap().is_empty());
    assert!(guard.history().unwrap().is_empty());

    drop(held);
    assert_eq!(guard.run(&plan, &mut Scripted::silent()).unwrap().outcome, Outcome::Success);
    assert_eq!(head(&repo_path), before);
}

#[test]
fn test_same_second_checkpoints_get_distinct_ids() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    let guard = Guard::open(Repository::new(&repo_path), &test_config(temp.path())).unwrap();

    let ids: Vec<String> = (0..3).map(|_| guard.checkpoint().unwrap().id).collect();

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3);
    assert_eq!(guard.rollback_target().unwrap().unwrap().id, ids[2]);
    assert_eq!(guard.list_checkpoints().unwrap()[0].id, ids[2]);
}

#[test]
fn test_checkpoint_leaves_repository_untouched() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    fs::write(repo_path.join("file.txt"), "edited").unwrap();
    fs::write(repo_path.join("new.txt"), "new").unwrap();
    git(&repo_path, &["add", "new.txt"]);
    fs::write(repo_path.join("scratch.txt"), "scratch").unwrap();

    let status = git(&repo_path, &["status", "--porcelain"]);
    let branches = git(&repo_path, &["branch", "--list", "main"]);
    let guard = Guard::open(Repository::new(&repo_path), &test_config(temp.path())).unwrap();

    let checkpoint = guard.checkpoint().unwrap();

    assert!(checkpoint.snapshot.is_some());
    assert_eq!(git(&repo_path, &["status", "--porcelain"]), status);
    assert_eq!(git(&repo_path, &["branch", "--list", "main"]), branches);
    // Snapshot refs stay out of the branch namespace
    assert!(!git(&repo_path, &["branch", "--list"]).contains("snapshots"));
}

#[test]
fn test_restore_abandons_rebase_in_progress() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "base\n", "Base");
    git(&repo_path, &["checkout", "--quiet", "-b", "feature"]);
    create_commit(&repo_path, "file.txt", "feature\n", "Feature");
    git(&repo_path, &["checkout", "--quiet", "main"]);
    create_commit(&repo_path, "file.txt", "main\n", "Main");
    let main_head = head(&repo_path);

    let guard = Guard::open(Repository::new(&repo_path), &test_config(temp.path())).unwrap();
    let record = guard
        .run(
            &Plan::new("rebase", RiskLevel::High, ["git rebase feature"]).unwrap(),
            &mut Scripted::answering("yes"),
        )
        .unwrap();
    assert_eq!(record.outcome, Outcome::PartialFailure);
    assert!(Repository::new(&repo_path).in_progress_operation().unwrap().is_some());

    guard.rollback().unwrap();

    assert_eq!(Repository::new(&repo_path).in_progress_operation().unwrap(), None);
    assert_eq!(head(&repo_path), main_head);
    assert_eq!(git(&repo_path, &["symbolic-ref", "--short", "HEAD"]), "main");
    assert_eq!(fs::read_to_string(repo_path.join("file.txt")).unwrap(), "main\n");
}

#[test]
fn test_hanging_command_times_out() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    git(&repo_path, &["config", "alias.hang", "!sleep 5"]);

    let mut config = test_config(temp.path());
    config.git.timeout_seconds = Some(1);
    let guard = Guard::open(Repository::new(&repo_path), &config).unwrap();

    let plan = Plan::new("hang", RiskLevel::Safe, ["git hang", "git branch never"]).unwrap();
    let record = guard.run(&plan, &mut Scripted::silent()).unwrap();

    assert_eq!(record.outcome, Outcome::PartialFailure);
    assert_eq!(record.commands.len(), 1);
    assert!(record.failure.unwrap().timed_out);
    assert!(!Repository::new(&repo_path).ref_exists("refs/heads/never").unwrap());
}

#[test]
fn test_scrubbed_env_not_visible_to_git() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    git(&repo_path, &["config", "alias.leak", "!printenv GITGUARD_TEST_SECRET"]);

    // SAFETY: variable name is unique to this test
    unsafe {
        std::env::set_var("GITGUARD_TEST_SECRET", "hunter2");
    }

    let plan = Plan::new("leak", RiskLevel::Safe, ["git leak"]).unwrap();

    let mut config = test_config(temp.path());
    config.git.scrubbed_env = vec!["GITGUARD_TEST_SECRET".to_string()];
    let guard = Guard::open(Repository::new(&repo_path), &config).unwrap();
    assert_eq!(guard.run(&plan, &mut Scripted::silent()).unwrap().outcome, Outcome::PartialFailure);

    config.git.scrubbed_env.clear();
    let guard = Guard::open(Repository::new(&repo_path), &config).unwrap();
    assert_eq!(guard.run(&plan, &mut Scripted::silent()).unwrap().outcome, Outcome::Success);

    unsafe {
        std::env::remove_var("GITGUARD_TEST_SECRET");
    }
}

#[test]
fn test_manager_lists_from_refs_without_ledger() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    let manager = CheckpointManager::new(Repository::new(&repo_path));

    let created = manager.create_checkpoint().unwrap();
    git(&repo_path, &["branch", "gitguard-backup-not-a-timestamp"]);

    let listed = manager.list_checkpoints().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert_eq!(listed[0].commit, created.commit);
}

#[test]
fn test_checkpoint_and_rollback_during_merge_conflict() {
    let (temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "a.txt", "base\n", "Base");
    git(&repo_path, &["checkout", "--quiet", "-b", "other"]);
    create_commit(&repo_path, "a.txt", "other\n", "Other change");
    git(&repo_path, &["checkout", "--quiet", "main"]);
    create_commit(&repo_path, "a.txt", "main\n", "Main change");

    let merge = std::process::Command::new("git")
        .args(["merge", "other"])
        .current_dir(&repo_path)
        .output()
        .unwrap();
    assert!(!merge.status.success(), "merge should conflict");
    let conflicted = fs::read_to_string(repo_path.join("a.txt")).unwrap();
    assert!(conflicted.contains("<<<<<<<"));

    let guard = Guard::open(Repository::new(&repo_path), &test_config(temp.path())).unwrap();
    let record = guard
        .run(
            &Plan::new("abort merge", RiskLevel::Medium, ["git merge --abort"]).unwrap(),
            &mut Scripted::answering("y"),
        )
        .unwrap();

    assert_eq!(record.outcome, Outcome::Success);
    assert_eq!(Repository::new(&repo_path).in_progress_operation().unwrap(), None);
    assert_eq!(fs::read_to_string(repo_path.join("a.txt")).unwrap(), "main\n");

    let checkpoint = guard
        .ledger()
        .checkpoint(&record.checkpoint_id.unwrap())
        .unwrap()
        .unwrap();
    let snapshot = checkpoint.snapshot.expect("conflicted tree is dirty");
    assert_eq!(snapshot.flattened_conflicts, vec!["a.txt".to_string()]);

    guard.rollback().unwrap();

    // Conflict markers come back; the conflict stages are recorded as plain content
    assert_eq!(fs::read_to_string(repo_path.join("a.txt")).unwrap(), conflicted);
    assert_eq!(git(&repo_path, &["diff", "--cached", "--name-only"]), "a.txt");
    assert_eq!(git(&repo_path, &["symbolic-ref", "--short", "HEAD"]), "main");
}
