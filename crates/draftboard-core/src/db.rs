// SQLite persistence for drafts, teams, players, picks and the audit trail.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::models::{
    AdpRanks, AuditAction, AuditEntry, Draft, DraftId, DraftStatus, NewDraft, NewPick, NewPlayer,
    NewTeam, Pick, PickId, Player, PlayerId, Position, Team, TeamId,
};

const DRAFT_COLUMNS: &str =
    "id, name, num_teams, scoring_format, draft_type, status, max_rounds, created_at";
const TEAM_COLUMNS: &str = "id, draft_id, name, owner_name, draft_position";
const PLAYER_COLUMNS: &str =
    "id, name, team, position, bye_week, dynasty_rank, std_rank, half_ppr_rank, ppr_rank";
const PICK_COLUMNS: &str =
    "id, draft_id, team_id, player_id, round, overall_pick, is_traded, adp_rank, picked_at";

/// SQLite-backed store. One connection behind a mutex. Writes that touch
/// several rows (a pick and its audit entry, a status change and its audit
/// entry) run in one transaction; a pick's read-validate-write sequence is
/// serialized above this layer.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drafts (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                name           TEXT NOT NULL,
                num_teams      INTEGER NOT NULL CHECK(num_teams BETWEEN 2 AND 14),
                scoring_format TEXT NOT NULL CHECK(scoring_format IN ('Standard', 'Half-PPR', 'PPR')),
                draft_type     TEXT NOT NULL CHECK(draft_type IN ('Redraft', 'Dynasty')),
                status         TEXT NOT NULL DEFAULT 'setup'
                               CHECK(status IN ('setup', 'active', 'paused', 'completed')),
                max_rounds     INTEGER NOT NULL DEFAULT 16 CHECK(max_rounds >= 0),
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS teams (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                draft_id       INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
                name           TEXT NOT NULL,
                owner_name     TEXT,
                draft_position INTEGER NOT NULL,
                UNIQUE(draft_id, draft_position),
                UNIQUE(draft_id, name)
            );

            CREATE TABLE IF NOT EXISTS players (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT NOT NULL,
                team          TEXT NOT NULL,
                position      TEXT NOT NULL
                              CHECK(position IN ('QB', 'RB', 'WR', 'TE', 'K', 'D/ST', 'DL', 'LB', 'DB')),
                bye_week      INTEGER CHECK(bye_week BETWEEN 1 AND 18),
                dynasty_rank  INTEGER,
                std_rank      INTEGER,
                half_ppr_rank INTEGER,
                ppr_rank      INTEGER
            );

            CREATE TABLE IF NOT EXISTS picks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                draft_id     INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
                team_id      INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                player_id    INTEGER NOT NULL REFERENCES players(id),
                round        INTEGER NOT NULL,
                overall_pick INTEGER NOT NULL CHECK(overall_pick >= 1),
                is_traded    INTEGER NOT NULL DEFAULT 0,
                adp_rank     INTEGER,
                picked_at    TEXT NOT NULL,
                UNIQUE(draft_id, overall_pick),
                UNIQUE(draft_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                draft_id     INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
                action_type  TEXT NOT NULL
                             CHECK(action_type IN ('pick', 'undo', 'trade', 'pause', 'resume', 'complete', 'start')),
                entity_id    INTEGER,
                details      TEXT NOT NULL DEFAULT '',
                performed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_teams_draft ON teams(draft_id);
            CREATE INDEX IF NOT EXISTS idx_picks_draft ON picks(draft_id);
            CREATE INDEX IF NOT EXISTS idx_picks_team ON picks(team_id);
            CREATE INDEX IF NOT EXISTS idx_players_position ON players(position);
            CREATE INDEX IF NOT EXISTS idx_players_name ON players(name);
            CREATE INDEX IF NOT EXISTS idx_audit_log_draft ON audit_log(draft_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Store a new draft in `setup`.
    pub fn insert_draft(&self, draft: &NewDraft) -> Result<Draft> {
        let conn = self.conn();
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO drafts (name, num_teams, scoring_format, draft_type, status, max_rounds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                draft.name,
                draft.num_teams,
                draft.scoring_format.as_str(),
                draft.draft_type.as_str(),
                DraftStatus::Setup.as_str(),
                draft.max_rounds,
                created_at,
            ],
        )
        .context("failed to create draft")?;

        Ok(Draft {
            id: conn.last_insert_rowid(),
            name: draft.name.clone(),
            num_teams: draft.num_teams,
            scoring_format: draft.scoring_format,
            draft_type: draft.draft_type,
            status: DraftStatus::Setup,
            max_rounds: draft.max_rounds,
            created_at,
        })
    }

    pub fn get_draft(&self, id: DraftId) -> Result<Option<Draft>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = ?1"),
            params![id],
            draft_from_row,
        )
        .optional()
        .context("failed to get draft")
    }

    /// All drafts, newest first.
    pub fn list_drafts(&self) -> Result<Vec<Draft>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DRAFT_COLUMNS} FROM drafts ORDER BY created_at DESC, id DESC"
            ))
            .context("failed to prepare list_drafts query")?;
        let drafts = stmt
            .query_map([], draft_from_row)
            .context("failed to list drafts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft rows")?;
        Ok(drafts)
    }

    /// Move a draft to `status` and record why, in one transaction.
    pub fn set_draft_status(
        &self,
        id: DraftId,
        status: DraftStatus,
        action: AuditAction,
        details: &str,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        update_status(&tx, id, status)?;
        insert_audit(&tx, id, action, None, details)?;
        tx.commit().context("failed to commit status change")?;
        Ok(())
    }

    /// Store a draft's league settings. Status and creation time are not
    /// touched.
    pub fn update_draft(&self, draft: &Draft) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE drafts
             SET name = ?1, num_teams = ?2, scoring_format = ?3, draft_type = ?4, max_rounds = ?5
             WHERE id = ?6",
            params![
                draft.name,
                draft.num_teams,
                draft.scoring_format.as_str(),
                draft.draft_type.as_str(),
                draft.max_rounds,
                draft.id,
            ],
        )
        .context("failed to update draft")?;
        Ok(())
    }

    /// Delete a draft together with its teams, picks and audit rows.
    /// Returns `false` if no such draft existed.
    pub fn delete_draft(&self, id: DraftId) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn
            .execute("DELETE FROM drafts WHERE id = ?1", params![id])
            .context("failed to delete draft")?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    pub fn insert_team(&self, draft_id: DraftId, team: &NewTeam) -> Result<Team> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO teams (draft_id, name, owner_name, draft_position) VALUES (?1, ?2, ?3, ?4)",
            params![draft_id, team.name, team.owner_name, team.draft_position],
        )
        .context("failed to create team")?;

        Ok(Team {
            id: conn.last_insert_rowid(),
            draft_id,
            name: team.name.clone(),
            owner_name: team.owner_name.clone(),
            draft_position: team.draft_position,
        })
    }

    pub fn get_team(&self, id: TeamId) -> Result<Option<Team>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
            params![id],
            team_from_row,
        )
        .optional()
        .context("failed to get team")
    }

    /// Teams of a draft ordered by draft position.
    pub fn teams_for_draft(&self, draft_id: DraftId) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TEAM_COLUMNS} FROM teams WHERE draft_id = ?1 ORDER BY draft_position"
            ))
            .context("failed to prepare teams_for_draft query")?;
        let teams = stmt
            .query_map(params![draft_id], team_from_row)
            .context("failed to query teams")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map team rows")?;
        Ok(teams)
    }

    pub fn update_team(&self, team: &Team) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE teams SET name = ?1, owner_name = ?2, draft_position = ?3 WHERE id = ?4",
            params![team.name, team.owner_name, team.draft_position, team.id],
        )
        .context("failed to update team")?;
        Ok(())
    }

    pub fn delete_team(&self, id: TeamId) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn
            .execute("DELETE FROM teams WHERE id = ?1", params![id])
            .context("failed to delete team")?;
        Ok(deleted > 0)
    }

    pub fn team_count(&self, draft_id: DraftId) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM teams WHERE draft_id = ?1",
            params![draft_id],
            |row| row.get(0),
        )
        .context("failed to count teams")
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub fn insert_player(&self, player: &NewPlayer) -> Result<Player> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (name, team, position, bye_week, dynasty_rank, std_rank, half_ppr_rank, ppr_rank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                player.name,
                player.team,
                player.position.as_str(),
                player.bye_week,
                player.adp.dynasty,
                player.adp.standard,
                player.adp.half_ppr,
                player.adp.ppr,
            ],
        )
        .context("failed to create player")?;

        Ok(Player {
            id: conn.last_insert_rowid(),
            name: player.name.clone(),
            team: player.team.clone(),
            position: player.position,
            bye_week: player.bye_week,
            adp: player.adp.clone(),
        })
    }

    pub fn get_player(&self, id: PlayerId) -> Result<Option<Player>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"),
            params![id],
            player_from_row,
        )
        .optional()
        .context("failed to get player")
    }

    /// Players not yet drafted in `draft_id` whose name contains `query`,
    /// optionally restricted to one position, alphabetically.
    pub fn search_available_players(
        &self,
        draft_id: DraftId,
        query: &str,
        position: Option<Position>,
        limit: i64,
    ) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PLAYER_COLUMNS} FROM players
                 WHERE name LIKE '%' || ?1 || '%' ESCAPE '\\'
                   AND (?2 IS NULL OR position = ?2)
                   AND id NOT IN (SELECT player_id FROM picks WHERE draft_id = ?3)
                 ORDER BY name
                 LIMIT ?4"
            ))
            .context("failed to prepare player search")?;
        let players = stmt
            .query_map(
                params![
                    escape_like(query),
                    position.map(|p| p.as_str()),
                    draft_id,
                    limit
                ],
                player_from_row,
            )
            .context("failed to search players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    // ------------------------------------------------------------------
    // Picks
    // ------------------------------------------------------------------

    /// Store a validated pick with its audit entry. With `completes_draft`
    /// the draft is marked completed in the same transaction, so a failure
    /// at any step leaves neither the pick nor the status change behind.
    ///
    /// The `(draft_id, overall_pick)` and `(draft_id, player_id)` unique
    /// constraints reject a second pick for the same slot or player; see
    /// [`is_constraint_violation`].
    pub fn record_pick(
        &self,
        pick: &NewPick,
        details: &str,
        completes_draft: bool,
    ) -> Result<Pick> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let picked_at = Utc::now();
        tx.execute(
            "INSERT INTO picks (draft_id, team_id, player_id, round, overall_pick, is_traded, adp_rank, picked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                pick.draft_id,
                pick.team_id,
                pick.player_id,
                pick.round,
                pick.overall_pick,
                pick.adp_rank,
                picked_at,
            ],
        )
        .context("failed to record pick")?;
        let id = tx.last_insert_rowid();

        insert_audit(&tx, pick.draft_id, AuditAction::Pick, Some(id), details)?;
        if completes_draft {
            update_status(&tx, pick.draft_id, DraftStatus::Completed)?;
            insert_audit(
                &tx,
                pick.draft_id,
                AuditAction::Complete,
                None,
                "Draft auto-completed",
            )?;
        }
        tx.commit().context("failed to commit pick")?;

        Ok(Pick {
            id,
            draft_id: pick.draft_id,
            team_id: pick.team_id,
            player_id: pick.player_id,
            round: pick.round,
            overall_pick: pick.overall_pick,
            is_traded: false,
            adp_rank: pick.adp_rank,
            picked_at,
        })
    }

    pub fn get_pick(&self, id: PickId) -> Result<Option<Pick>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?1"),
            params![id],
            pick_from_row,
        )
        .optional()
        .context("failed to get pick")
    }

    /// Picks of a draft in sequence order.
    pub fn picks_for_draft(&self, draft_id: DraftId) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PICK_COLUMNS} FROM picks WHERE draft_id = ?1 ORDER BY overall_pick"
            ))
            .context("failed to prepare picks_for_draft query")?;
        let picks = stmt
            .query_map(params![draft_id], pick_from_row)
            .context("failed to query picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pick rows")?;
        Ok(picks)
    }

    /// The pick with the highest sequence number, if any.
    pub fn last_pick(&self, draft_id: DraftId) -> Result<Option<Pick>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {PICK_COLUMNS} FROM picks WHERE draft_id = ?1
                 ORDER BY overall_pick DESC LIMIT 1"
            ),
            params![draft_id],
            pick_from_row,
        )
        .optional()
        .context("failed to get last pick")
    }

    pub fn pick_count(&self, draft_id: DraftId) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM picks WHERE draft_id = ?1",
            params![draft_id],
            |row| row.get(0),
        )
        .context("failed to count picks")
    }

    pub fn drafted_player_ids(&self, draft_id: DraftId) -> Result<Vec<PlayerId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT player_id FROM picks WHERE draft_id = ?1")
            .context("failed to prepare drafted_player_ids query")?;
        let ids = stmt
            .query_map(params![draft_id], |row| row.get(0))
            .context("failed to get drafted player ids")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player id rows")?;
        Ok(ids)
    }

    /// Delete a pick and audit the undo. Returns `false`, writing nothing,
    /// if the pick no longer exists.
    pub fn delete_pick(&self, pick: &Pick, details: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let deleted = tx
            .execute("DELETE FROM picks WHERE id = ?1", params![pick.id])
            .context("failed to delete pick")?;
        if deleted == 0 {
            return Ok(false);
        }
        insert_audit(&tx, pick.draft_id, AuditAction::Undo, Some(pick.id), details)?;
        tx.commit().context("failed to commit undo")?;
        Ok(true)
    }

    /// Move a pick to another team, flag it as traded and audit the trade.
    /// Round and overall pick number are not touched. Returns `false`,
    /// writing nothing, if the pick no longer exists.
    pub fn reassign_pick(&self, pick: &Pick, to_team_id: TeamId, details: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let updated = tx
            .execute(
                "UPDATE picks SET team_id = ?1, is_traded = 1 WHERE id = ?2",
                params![to_team_id, pick.id],
            )
            .context("failed to reassign pick")?;
        if updated != 1 {
            return Ok(false);
        }
        insert_audit(&tx, pick.draft_id, AuditAction::Trade, Some(pick.id), details)?;
        tx.commit().context("failed to commit trade")?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Audit trail
    // ------------------------------------------------------------------

    /// Audit entries for a draft, most recent first.
    pub fn audit_log(&self, draft_id: DraftId) -> Result<Vec<AuditEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, draft_id, action_type, entity_id, details, performed_at
                 FROM audit_log WHERE draft_id = ?1 ORDER BY id DESC",
            )
            .context("failed to prepare audit_log query")?;
        let entries = stmt
            .query_map(params![draft_id], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    draft_id: row.get(1)?,
                    action: parse_column(row, 2)?,
                    entity_id: row.get(3)?,
                    details: row.get(4)?,
                    performed_at: row.get::<_, DateTime<Utc>>(5)?,
                })
            })
            .context("failed to query audit log")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map audit rows")?;
        Ok(entries)
    }
}

/// Whether `err` was caused by a SQLite constraint (unique, foreign key,
/// check) rejecting a write.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
        )
    })
}

// ---------------------------------------------------------------------------
// Statements shared by the transactional writes
// ---------------------------------------------------------------------------

fn update_status(conn: &Connection, id: DraftId, status: DraftStatus) -> Result<()> {
    conn.execute(
        "UPDATE drafts SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )
    .context("failed to update draft status")?;
    Ok(())
}

fn insert_audit(
    conn: &Connection,
    draft_id: DraftId,
    action: AuditAction,
    entity_id: Option<i64>,
    details: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (draft_id, action_type, entity_id, details, performed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![draft_id, action.as_str(), entity_id, details, Utc::now()],
    )
    .context("failed to log audit entry")?;
    Ok(())
}

/// Make `%`, `_` and `\` in a search term match literally under
/// `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<Draft> {
    Ok(Draft {
        id: row.get(0)?,
        name: row.get(1)?,
        num_teams: row.get(2)?,
        scoring_format: parse_column(row, 3)?,
        draft_type: parse_column(row, 4)?,
        status: parse_column(row, 5)?,
        max_rounds: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        name: row.get(2)?,
        owner_name: row.get(3)?,
        draft_position: row.get(4)?,
    })
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        team: row.get(2)?,
        position: parse_column(row, 3)?,
        bye_week: row.get(4)?,
        adp: AdpRanks {
            dynasty: row.get(5)?,
            standard: row.get(6)?,
            half_ppr: row.get(7)?,
            ppr: row.get(8)?,
        },
    })
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<Pick> {
    Ok(Pick {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        team_id: row.get(2)?,
        player_id: row.get(3)?,
        round: row.get(4)?,
        overall_pick: row.get(5)?,
        is_traded: row.get(6)?,
        adp_rank: row.get(7)?,
        picked_at: row.get(8)?,
    })
}
