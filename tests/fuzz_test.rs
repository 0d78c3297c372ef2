//! Randomised soundness tests for the read-only gate.
//!
//! Generates benign queries, adversarial mutations of them and plain noise,
//! and checks every accepted input against an independent restatement of
//! the acceptance rule. Nothing here may panic.

use mssql_mcp_server::tools::sql_validator::{normalize, strip_comments, validate};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use regex::Regex;

const ITERATIONS: usize = 2_000;

const BLOCKED: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "EXEC",
    "EXECUTE",
    "MERGE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "BULK",
    "OPENROWSET",
    "OPENDATASOURCE",
    "SP_CONFIGURE",
    "RECONFIGURE",
    "DBCC",
    "SHUTDOWN",
    "KILL",
    "DISABLE",
    "ENABLE",
    "RECEIVE",
    "SEND",
    "WRITETEXT",
    "UPDATETEXT",
    "CHECKPOINT",
    "SETUSER",
    "USE",
];

const BENIGN: &[&str] = &[
    "SELECT * FROM Users",
    "SELECT Id, Name FROM dbo.Users WHERE Id = @id",
    "SELECT TOP 10 * FROM sales.Orders ORDER BY OrderDate DESC",
    "WITH x AS (SELECT 1 AS n) SELECT n FROM x",
    "SELECT COUNT(*) FROM dbo.Orders o JOIN dbo.Customers c ON c.Id = o.CustomerId",
    "SELECT updated_at, created_by FROM audit_log",
    "SELECT name FROM sys.tables",
];

const ATTACKS: &[&str] = &[
    "; DROP TABLE Users",
    "; DELETE FROM Users",
    " INTO #tmp",
    " FOR UPDATE",
    "; EXEC xp_cmdshell 'dir'",
    " UNION SELECT * FROM OPENQUERY(srv, 'SELECT 1')",
    "; USE master",
    "; TRUNCATE TABLE Logs",
    " /* hidden */; ALTER LOGIN sa ENABLE",
    "\n--\n; GRANT CONTROL TO public",
    "; EXEC ('DROP TABLE x') AT LinkedSrv",
    " OPTION (MAXDOP 1); SHUTDOWN",
    "; DISABLE TRIGGER ALL ON DATABASE",
    " ENABLE TRIGGER trg ON dbo.Users",
    "; RECEIVE TOP(1) * FROM dbo.Q",
    "; SEND ON CONVERSATION @h ('x')",
    "; WRITETEXT dbo.T.c @p 'x'",
    "; UPDATETEXT dbo.T.c @p 0 NULL 'x'",
    "; CHECKPOINT",
    "; WAITFOR DELAY '00:00:10'",
    "; DECLARE @x INT",
];

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Flip the case of random ASCII letters.
fn scramble_case(sql: &str) -> String {
    let mut rng = rand::thread_rng();
    sql.chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Replace single spaces with random whitespace or comments.
fn scramble_whitespace(sql: &str) -> String {
    let fillers = [" ", "  ", "\t", "\n", "\r\n", " /**/ ", " /* x */ ", " --c\n"];
    let mut rng = rand::thread_rng();
    sql.split(' ')
        .map(str::to_string)
        .collect::<Vec<_>>()
        .join(fillers.choose(&mut rng).copied().unwrap_or(" "))
}

fn generate() -> String {
    let mut rng = rand::thread_rng();
    let base = BENIGN.choose(&mut rng).copied().unwrap_or("SELECT 1");
    match rng.gen_range(0..6) {
        0 => base.to_string(),
        1 => format!("{}{}", base, ATTACKS.choose(&mut rng).copied().unwrap_or("")),
        2 => scramble_case(&format!(
            "{}{}",
            base,
            ATTACKS.choose(&mut rng).copied().unwrap_or("")
        )),
        3 => scramble_whitespace(&format!(
            "{}{}",
            base,
            ATTACKS.choose(&mut rng).copied().unwrap_or("")
        )),
        4 => format!(
            "{} {}",
            BLOCKED.choose(&mut rng).copied().unwrap_or("DROP"),
            random_string(rng.gen_range(0..40))
        ),
        _ => random_string(rng.gen_range(0..200)),
    }
}

struct Oracle {
    leading: Regex,
    blocked: Vec<Regex>,
    bypass: Vec<Regex>,
}

impl Oracle {
    fn new() -> Self {
        let mut blocked: Vec<Regex> = BLOCKED
            .iter()
            .map(|kw| Regex::new(&format!(r"\b{}\b", kw)).unwrap())
            .collect();
        blocked.push(Regex::new(r"\bXP_\w*").unwrap());

        let bypass = [
            r";\s*(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|EXEC|EXECUTE|MERGE|GRANT|REVOKE|DENY|USE)\b",
            r"\bSELECT\b[\s\S]*?\bINTO\b",
            r"\bFOR\s+(UPDATE|DELETE)\b",
            r"\bOPENQUERY\s*\(",
            r"\bEXEC(UTE)?\b[\s\S]*\bAT\s+\S+",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();

        Self {
            leading: Regex::new(r"^(SELECT\b|WITH\b|SET\s+SHOWPLAN_(XML|ALL|TEXT)\b)").unwrap(),
            blocked,
            bypass,
        }
    }

    /// Independent statement of what an accepted query must satisfy.
    fn check_accepted(&self, sql: &str) {
        let stripped = strip_comments(sql).expect("accepted query must tokenize");
        let normalized = normalize(&stripped);
        assert!(
            self.leading.is_match(&normalized),
            "accepted without allowed leading keyword: {:?}",
            sql
        );
        for re in &self.blocked {
            assert!(
                !re.is_match(&normalized),
                "accepted with blocked keyword {}: {:?}",
                re,
                sql
            );
        }
        for re in &self.bypass {
            assert!(
                !re.is_match(&normalized),
                "accepted matching bypass {}: {:?}",
                re,
                sql
            );
        }
        assert!(
            only_reads_follow_semicolons(&normalized),
            "accepted with a non-read statement after ';': {:?}",
            sql
        );
    }
}

/// Every `;` is followed by nothing, another `;`, or a SELECT/WITH word.
///
/// Plain string scanning, independent of the keyword lists.
fn only_reads_follow_semicolons(normalized: &str) -> bool {
    normalized.split(';').skip(1).all(|rest| {
        let rest = rest.trim_start();
        if rest.is_empty() {
            return true;
        }
        let word: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        word == "SELECT" || word == "WITH"
    })
}

#[test]
fn semicolon_check_matches_by_hand() {
    assert!(only_reads_follow_semicolons("SELECT 1;"));
    assert!(only_reads_follow_semicolons("SELECT 1; SELECT 2;;"));
    assert!(!only_reads_follow_semicolons("SELECT 1; CHECKPOINT"));
    assert!(!only_reads_follow_semicolons("SELECT 1; (SELECT 2)"));
    assert!(!only_reads_follow_semicolons("SELECT 1; SELECTED"));
}

#[test]
fn fuzz_validator_soundness() {
    let oracle = Oracle::new();
    for _ in 0..ITERATIONS {
        let sql = generate();
        let verdict = validate(&sql);
        if verdict.valid {
            oracle.check_accepted(&sql);
        } else {
            assert!(verdict.reason.is_some(), "rejection without reason: {:?}", sql);
        }
        assert_eq!(verdict, validate(&sql), "not idempotent: {:?}", sql);
    }
}

#[test]
fn fuzz_attacks_never_pass() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let base = BENIGN.choose(&mut rng).copied().unwrap_or("SELECT 1");
        let attack = ATTACKS.choose(&mut rng).copied().unwrap_or("; DROP TABLE x");
        let sql = scramble_case(&format!("{}{}", base, attack));
        assert!(!validate(&sql).valid, "attack accepted: {:?}", sql);
    }
}

#[test]
fn fuzz_benign_queries_pass() {
    for _ in 0..200 {
        for sql in BENIGN {
            let mutated = scramble_case(sql);
            assert!(validate(&mutated).valid, "benign query rejected: {:?}", mutated);
        }
    }
}

#[test]
fn fuzz_edge_case_strings_do_not_panic() {
    let inputs = vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "[unterminated".to_string(),
        "/* unterminated".to_string(),
        "a".repeat(100_000),
        "\u{0000}\u{FFFF}".to_string(),
        "SELECT N'ünïcødé' AS x".to_string(),
        ";;;;".to_string(),
        "@@@@".to_string(),
    ];
    for sql in inputs {
        let _ = validate(&sql);
    }
}
