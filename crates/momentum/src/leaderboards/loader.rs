use futures_util::TryStreamExt;
use itertools::Itertools;

use super::{Leaderboard, LeaderboardRun, LeaderboardType, MapId, RunSource, TrackType};
use crate::Gamemode;
use crate::database::{self, Database};
use crate::time::Seconds;
use crate::users::UserId;

#[derive(Debug, Display, Error, From)]
#[display("failed to load leaderboard runs: {_0}")]
#[from(forward)]
pub struct LoadRunsError(database::Error);

/// One run, or one leaderboard without any runs.
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    map_id: i32,
    gamemode: i32,
    track_num: i32,
    style: i32,
    user_id: Option<i32>,
    time: Option<f64>,
}

impl RunRow {
    fn leaderboard_key(&self) -> (i32, i32, i32, i32) {
        (self.map_id, self.gamemode, self.track_num, self.style)
    }
}

impl RunSource for Database {
    /// Runs a single statement so every leaderboard is read at the same point in time.
    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn load_ranked_primary_runs(&self) -> Result<Vec<Leaderboard>, LoadRunsError> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"SELECT
                 l."mapID" AS map_id,
                 l.gamemode AS gamemode,
                 l."trackNum" AS track_num,
                 l.style AS style,
                 r."userID" AS user_id,
                 r.time AS time
               FROM "Leaderboard" AS l
               LEFT JOIN "LeaderboardRun" AS r
                 ON r."mapID" = l."mapID"
                AND r.gamemode = l.gamemode
                AND r."trackType" = l."trackType"
                AND r."trackNum" = l."trackNum"
                AND r.style = l.style
               WHERE l.type = $1
               AND l."trackType" = $2
               ORDER BY l."mapID", l.gamemode, l."trackNum", l.style"#,
        )
        .bind(LeaderboardType::Ranked.code())
        .bind(TrackType::Main.code())
        .fetch(self.as_ref())
        .map_err(database::Error::from)
        .try_collect::<Vec<_>>()
        .await?;

        debug!(rows = rows.len(), "fetched leaderboard runs");

        Ok(group_rows(rows))
    }
}

/// Groups rows, which must be ordered by leaderboard, into [`Leaderboard`]s.
///
/// Leaderboards of unranked gamemodes and runs with malformed times are skipped.
fn group_rows(rows: Vec<RunRow>) -> Vec<Leaderboard> {
    let mut leaderboards = Vec::new();

    for ((map_id, gamemode, track_num, style), rows) in
        &rows.into_iter().chunk_by(RunRow::leaderboard_key)
    {
        let mode = match Gamemode::try_from(gamemode) {
            Ok(mode) => mode,
            Err(error) => {
                warn!(%error, map_id, track_num, style, "skipping leaderboard");
                continue;
            },
        };

        let runs = rows
            .filter_map(|row| {
                let (user_id, time) = row.user_id.zip(row.time)?;

                match Seconds::try_from(time) {
                    Ok(time) => Some(LeaderboardRun { user_id: UserId::from_inner(user_id), time }),
                    Err(error) => {
                        warn!(%error, map_id, %mode, user_id, time, "skipping run with malformed time");
                        None
                    },
                }
            })
            .collect();

        leaderboards.push(Leaderboard {
            map_id: MapId::from_inner(map_id),
            mode,
            track_num,
            style,
            runs,
        });
    }

    leaderboards
}
