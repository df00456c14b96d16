//! Database-backed store tests.
//!
//! These run against a throwaway PostgreSQL pointed to by
//! `RELTO_TEST_DATABASE_URL` and silently skip when it is unset, so the
//! default `cargo test` stays hermetic. The harness creates the schema
//! objects the daemon normally assumes the deployment scripts created.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use relto_store::{AccountStore, ScoreStore, ScoreType, TemplateStore, VaultStore};
use relto_types::challenge::{buggy_hash_login, hash_password};
use relto_types::{NodeType, PlayerSummary, StandardNode};
use relto_vault::{fields, Node, NodeRef};

const SCHEMA_SQL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS auth",
    "CREATE SCHEMA IF NOT EXISTS vault",
    "CREATE SCHEMA IF NOT EXISTS game",
    r#"CREATE TABLE IF NOT EXISTS vault."Nodes" (
        idx BIGSERIAL PRIMARY KEY,
        "CreateTime" BIGINT, "ModifyTime" BIGINT,
        "CreateAgeName" TEXT, "CreateAgeUuid" UUID,
        "CreatorUuid" UUID, "CreatorIdx" BIGINT, "NodeType" INTEGER,
        "Int32_1" INTEGER, "Int32_2" INTEGER, "Int32_3" INTEGER, "Int32_4" INTEGER,
        "Uint32_1" BIGINT, "Uint32_2" BIGINT, "Uint32_3" BIGINT, "Uint32_4" BIGINT,
        "Uuid_1" UUID, "Uuid_2" UUID, "Uuid_3" UUID, "Uuid_4" UUID,
        "String64_1" TEXT, "String64_2" TEXT, "String64_3" TEXT,
        "String64_4" TEXT, "String64_5" TEXT, "String64_6" TEXT,
        "IString64_1" TEXT, "IString64_2" TEXT,
        "Text_1" TEXT, "Text_2" TEXT,
        "Blob_1" BYTEA, "Blob_2" BYTEA
    )"#,
    r#"CREATE TABLE IF NOT EXISTS vault."NodeRefs" (
        "ParentIdx" BIGINT NOT NULL,
        "ChildIdx" BIGINT NOT NULL,
        "OwnerIdx" BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY ("ParentIdx", "ChildIdx")
    )"#,
    r#"CREATE TABLE IF NOT EXISTS vault."GlobalStates" (
        "Descriptor" TEXT PRIMARY KEY,
        "SdlBlob" TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS auth."Accounts" (
        idx BIGSERIAL PRIMARY KEY,
        "AcctUuid" UUID NOT NULL,
        "PassHash" TEXT NOT NULL,
        "Login" TEXT NOT NULL,
        "AcctFlags" BIGINT NOT NULL DEFAULT 0,
        "BillingType" BIGINT NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS auth."Players" (
        idx BIGSERIAL PRIMARY KEY,
        "AcctUuid" UUID NOT NULL,
        "PlayerIdx" BIGINT NOT NULL,
        "PlayerName" TEXT NOT NULL,
        "AvatarShape" TEXT NOT NULL,
        "Explorer" BIGINT NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS auth."Scores" (
        idx BIGSERIAL PRIMARY KEY,
        "OwnerIdx" BIGINT NOT NULL,
        "CreateTime" BIGINT NOT NULL,
        "Type" INTEGER NOT NULL,
        "Name" TEXT NOT NULL,
        "Points" INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS game."Servers" (
        idx BIGSERIAL PRIMARY KEY,
        "AgeUuid" UUID NOT NULL,
        "AgeFilename" TEXT NOT NULL,
        "DisplayName" TEXT NOT NULL,
        "AgeIdx" BIGINT NOT NULL,
        "SdlIdx" BIGINT NOT NULL,
        "Temporary" BOOLEAN NOT NULL
    )"#,
    r#"CREATE OR REPLACE FUNCTION vault.find_folder(parent BIGINT, folder INTEGER)
    RETURNS TABLE(idx BIGINT) AS $$
        SELECT n.idx FROM vault."Nodes" n
        JOIN vault."NodeRefs" r ON r."ChildIdx" = n.idx
        WHERE r."ParentIdx" = parent AND n."Int32_1" = folder
          AND n."NodeType" IN (22, 30, 34)
    $$ LANGUAGE SQL"#,
    r#"CREATE OR REPLACE FUNCTION auth.create_score(
        owner BIGINT, stype INTEGER, sname TEXT, spoints INTEGER
    ) RETURNS BIGINT AS $$
    DECLARE new_idx BIGINT;
    BEGIN
        IF EXISTS (SELECT 1 FROM auth."Scores"
                   WHERE "OwnerIdx" = owner AND "Name" = sname) THEN
            RETURN -1;
        END IF;
        INSERT INTO auth."Scores" ("OwnerIdx", "CreateTime", "Type", "Name", "Points")
            VALUES (owner, EXTRACT(EPOCH FROM now())::BIGINT, stype, sname, spoints)
            RETURNING auth."Scores".idx INTO new_idx;
        RETURN new_idx;
    END $$ LANGUAGE plpgsql"#,
    r#"CREATE OR REPLACE FUNCTION auth.add_score_points(
        score BIGINT, delta INTEGER, allow_negative BOOLEAN
    ) RETURNS INTEGER AS $$
    BEGIN
        IF allow_negative THEN
            UPDATE auth."Scores" SET "Points" = "Points" + delta WHERE idx = score;
        ELSE
            UPDATE auth."Scores" SET "Points" = GREATEST(0, "Points" + delta) WHERE idx = score;
        END IF;
        RETURN 1;
    END $$ LANGUAGE plpgsql"#,
    r#"CREATE OR REPLACE FUNCTION auth.transfer_score_points(
        src BIGINT, dst BIGINT, amount INTEGER, allow_negative BOOLEAN
    ) RETURNS INTEGER AS $$
    DECLARE src_points INTEGER;
    BEGIN
        SELECT "Points" INTO src_points FROM auth."Scores" WHERE idx = src;
        IF NOT allow_negative AND src_points < amount THEN
            RETURN 0;
        END IF;
        UPDATE auth."Scores" SET "Points" = "Points" - amount WHERE idx = src;
        UPDATE auth."Scores" SET "Points" = "Points" + amount WHERE idx = dst;
        RETURN 1;
    END $$ LANGUAGE plpgsql"#,
];

/// Connects to the test database, or `None` to skip the test.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("RELTO_TEST_DATABASE_URL").ok()?;
    let pool = relto_store::connect(&url).await.expect("connect test database");
    for statement in SCHEMA_SQL {
        sqlx::query(statement).execute(&pool).await.expect("create schema");
    }
    Some(pool)
}

/// Short unique suffix so tests can rerun against the same database.
fn nonce() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[tokio::test]
#[serial]
async fn test_node_create_fetch_update() {
    let Some(pool) = test_pool().await else { return };

    let mut node = Node::new();
    node.set_node_type(NodeType::Chronicle.raw());
    node.set_string64_1("JourneyCloths");
    node.set_int32_1(7);
    let idx = VaultStore::create(&pool, &node).await.expect("create");
    assert_ne!(idx, 0);

    let fetched = VaultStore::fetch(&pool, idx).await.expect("fetch");
    assert!(fetched.has(fields::NODE_IDX));
    assert!(fetched.has(fields::CREATE_TIME));
    assert!(fetched.has(fields::MODIFY_TIME));
    assert_eq!(fetched.node_idx, idx);
    assert_eq!(fetched.node_type, NodeType::Chronicle.raw());
    assert_eq!(fetched.string64_1, "JourneyCloths");
    assert_eq!(fetched.int32_1, 7);
    assert!(!fetched.has(fields::STRING64_2));

    // A partial update writes only the masked fields.
    let mut patch = Node::new();
    patch.set_node_idx(idx);
    patch.set_int32_1(8);
    assert!(VaultStore::update(&pool, &patch).await.expect("update"));

    let fetched = VaultStore::fetch(&pool, idx).await.expect("refetch");
    assert_eq!(fetched.int32_1, 8);
    assert_eq!(fetched.string64_1, "JourneyCloths");

    let missing = VaultStore::fetch(&pool, u32::MAX - 5).await.expect("fetch missing");
    assert!(missing.is_null());
}

#[tokio::test]
#[serial]
async fn test_ref_unref_restores_edge_set() {
    let Some(pool) = test_pool().await else { return };

    let mut node = Node::new();
    node.set_node_type(NodeType::Folder.raw());
    let parent = VaultStore::create(&pool, &node).await.expect("parent");
    let child = VaultStore::create(&pool, &node).await.expect("child");

    assert!(!VaultStore::has_node(&pool, parent, child).await.expect("has"));
    assert!(VaultStore::ref_node(&pool, parent, child, 5).await.expect("ref"));
    // Idempotent: the second insert creates nothing.
    assert!(!VaultStore::ref_node(&pool, parent, child, 5).await.expect("re-ref"));
    assert!(VaultStore::has_node(&pool, parent, child).await.expect("has"));

    assert!(VaultStore::unref_node(&pool, parent, child).await.expect("unref"));
    assert!(!VaultStore::unref_node(&pool, parent, child).await.expect("re-unref"));
    assert!(!VaultStore::has_node(&pool, parent, child).await.expect("has"));
}

#[tokio::test]
#[serial]
async fn test_find_nodes_matches_template_fields() {
    let Some(pool) = test_pool().await else { return };
    let marker = nonce();

    let mut a = Node::new();
    a.set_node_type(NodeType::TextNote.raw());
    a.set_string64_3(marker.clone());
    a.set_istring64_1("KItchen");
    let a_idx = VaultStore::create(&pool, &a).await.expect("a");

    let mut b = Node::new();
    b.set_node_type(NodeType::TextNote.raw());
    b.set_string64_3(marker.clone());
    b.set_istring64_1("garden");
    VaultStore::create(&pool, &b).await.expect("b");

    // Case-insensitive match on the IString64 field.
    let mut template = Node::new();
    template.set_string64_3(marker.clone());
    template.set_istring64_1("kitchen");
    let found = VaultStore::find_nodes(&pool, &template).await.expect("find");
    assert_eq!(found, vec![a_idx]);

    // Case-sensitive field does not fold.
    let mut template = Node::new();
    template.set_string64_3(marker.to_uppercase());
    let found = VaultStore::find_nodes(&pool, &template).await.expect("find");
    assert!(found.is_empty());
}

#[tokio::test]
#[serial]
async fn test_fetch_tree_walks_breadth_first_with_cycles() {
    let Some(pool) = test_pool().await else { return };

    let mut node = Node::new();
    node.set_node_type(NodeType::Folder.raw());
    let root = VaultStore::create(&pool, &node).await.expect("root");
    let mid = VaultStore::create(&pool, &node).await.expect("mid");
    let leaf = VaultStore::create(&pool, &node).await.expect("leaf");

    VaultStore::ref_node(&pool, root, mid, 0).await.expect("ref");
    VaultStore::ref_node(&pool, mid, leaf, 0).await.expect("ref");
    // Deliberate cycle back to the root.
    VaultStore::ref_node(&pool, leaf, root, 0).await.expect("ref");

    let edges = VaultStore::fetch_tree(&pool, root).await.expect("tree");
    assert_eq!(
        edges,
        vec![
            NodeRef::new(root, mid, 0),
            NodeRef::new(mid, leaf, 0),
            NodeRef::new(leaf, root, 0),
        ]
    );
}

#[tokio::test]
#[serial]
async fn test_send_node_links_under_inbox() {
    let Some(pool) = test_pool().await else { return };

    let acct = Uuid::new_v4();
    let name = format!("Courier-{}", nonce());
    let (player_idx, _info_idx, _hood) =
        TemplateStore::create_player(&pool, acct, &name, "female", 1)
            .await
            .expect("create player");

    let mut note = Node::new();
    note.set_node_type(NodeType::TextNote.raw());
    note.set_text_1("meet me in the garden");
    let note_idx = VaultStore::create(&pool, &note).await.expect("note");

    let edge = VaultStore::send_node(&pool, note_idx, player_idx, 77)
        .await
        .expect("send");
    assert!(!edge.is_empty());
    assert_eq!(edge.child, note_idx);
    assert_eq!(edge.owner, 77);

    let inbox = VaultStore::find_folder(&pool, player_idx, StandardNode::InboxFolder)
        .await
        .expect("find folder")
        .expect("player has inbox");
    assert_eq!(edge.parent, inbox);

    // Sending the same node again creates nothing.
    let repeat = VaultStore::send_node(&pool, note_idx, player_idx, 77)
        .await
        .expect("resend");
    assert!(repeat.is_empty());
}

#[tokio::test]
#[serial]
async fn test_account_roundtrip_and_challenge() {
    let Some(pool) = test_pool().await else { return };

    let login = format!("alice-{}", nonce());
    assert!(AccountStore::add_account(&pool, &login, "pw").await.expect("add"));
    // Case-insensitive duplicate.
    assert!(!AccountStore::add_account(&pool, &login.to_uppercase(), "pw").await.expect("dup"));

    let row = AccountStore::lookup_login(&pool, &login.to_uppercase())
        .await
        .expect("lookup")
        .expect("account exists");
    assert_eq!(row.pass_hash, hash_password("pw"));
    assert_eq!(row.acct_flags, 0);
    assert_eq!(row.billing_type, 1);

    // The challenge combination the login handler verifies.
    let challenge = buggy_hash_login(row.pass_hash, 0x1111, 0x2222);
    assert_eq!(challenge, buggy_hash_login(hash_password("pw"), 0x1111, 0x2222));

    let roster = AccountStore::player_roster(&pool, row.acct_uuid).await.expect("roster");
    assert!(roster.is_empty());

    assert!(AccountStore::lookup_login(&pool, &format!("nobody-{}", nonce()))
        .await
        .expect("lookup missing")
        .is_none());
}

#[tokio::test]
#[serial]
async fn test_duplicate_player_name() {
    let Some(pool) = test_pool().await else { return };

    let name = format!("Zelda-{}", nonce());
    let acct = Uuid::new_v4();
    assert!(!AccountStore::player_name_exists(&pool, &name).await.expect("check"));

    AccountStore::insert_player(
        &pool,
        acct,
        &PlayerSummary {
            player_id: 9000,
            player_name: name.clone(),
            avatar_shape: "female".to_string(),
            explorer: 1,
        },
    )
    .await
    .expect("insert");

    assert!(AccountStore::player_name_exists(&pool, &name).await.expect("recheck"));
}

#[tokio::test]
#[serial]
async fn test_golf_transfer_goes_negative() {
    let Some(pool) = test_pool().await else { return };

    let owner = 600_000 + (clock_nonce() % 100_000);
    let g1 = ScoreStore::create(&pool, owner, ScoreType::Golf, "g1", 0)
        .await
        .expect("create g1")
        .expect("fresh score");
    let g2 = ScoreStore::create(&pool, owner, ScoreType::Golf, "g2", 0)
        .await
        .expect("create g2")
        .expect("fresh score");

    // Duplicate (owner, name) pair is refused by the DB function.
    assert!(ScoreStore::create(&pool, owner, ScoreType::Golf, "g1", 0)
        .await
        .expect("dup create")
        .is_none());

    let moved = ScoreStore::transfer_points(&pool, g1, g2, 5, true).await.expect("transfer");
    assert!(moved);

    let scores = ScoreStore::get_scores(&pool, owner, "g1").await.expect("g1");
    assert_eq!(scores[0].points, -5);
    let scores = ScoreStore::get_scores(&pool, owner, "g2").await.expect("g2");
    assert_eq!(scores[0].points, 5);

    // Accumulative transfers clamp at the source balance instead.
    let a1 = ScoreStore::create(&pool, owner, ScoreType::Accumulative, "a1", 3)
        .await
        .expect("create a1")
        .expect("fresh score");
    let a2 = ScoreStore::create(&pool, owner, ScoreType::Accumulative, "a2", 0)
        .await
        .expect("create a2")
        .expect("fresh score");
    let moved = ScoreStore::transfer_points(&pool, a1, a2, 10, false).await.expect("transfer");
    assert!(!moved);
}

/// Pseudo-unique owner id derived from the clock, so score tests can
/// re-run against a persistent database.
fn clock_nonce() -> u32 {
    (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0))
        % 1_000_000
}
