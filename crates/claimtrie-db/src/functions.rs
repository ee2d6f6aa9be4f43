//! Custom SQL functions registered on writer connections.
//!
//! `shortest_id(other_claim_id, claim_id)` is an aggregate that yields the
//! shortest prefix of `claim_id`, prefixed with `#`, that no other id in the
//! group shares. It yields NULL when the group is empty or no other id
//! differs, so callers wrap it in `COALESCE(.., '#' || substr(claim_id, 1, 1))`.

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::Connection;

use crate::Result;

/// Incremental shortest-unique-prefix state.
///
/// Each step only ever lengthens the prefix, so the final value is the
/// longest common prefix with any other id plus one character.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShortestId {
    new_id: Option<String>,
    short_len: usize,
}

impl ShortestId {
    pub fn step(&mut self, other_id: &str, new_id: &str) {
        let new_id = self.new_id.get_or_insert_with(|| new_id.to_string());
        let first_difference = new_id
            .bytes()
            .zip(other_id.bytes())
            .position(|(a, b)| a != b);
        if let Some(i) = first_difference {
            if i + 1 > self.short_len {
                self.short_len = i + 1;
            }
        }
    }

    pub fn finalize(&self) -> Option<String> {
        match &self.new_id {
            Some(id) if self.short_len > 0 => {
                let end = self.short_len.min(id.len());
                Some(format!("#{}", &id[..end]))
            }
            _ => None,
        }
    }
}

/// Shortest prefix of `claim_id` distinguishing it from every id in `others`.
///
/// Falls back to the first character when nothing else competes.
pub fn shortest_unique_id<'a, I>(claim_id: &str, others: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut state = ShortestId::default();
    for other in others {
        state.step(other, claim_id);
    }
    state
        .finalize()
        .unwrap_or_else(|| format!("#{}", claim_id.get(..1).unwrap_or_default()))
}

struct ShortestIdAggregate;

impl Aggregate<ShortestId, Option<String>> for ShortestIdAggregate {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<ShortestId> {
        Ok(ShortestId::default())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut ShortestId) -> rusqlite::Result<()> {
        let other_id: String = ctx.get(0)?;
        let new_id: String = ctx.get(1)?;
        acc.step(&other_id, &new_id);
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        acc: Option<ShortestId>,
    ) -> rusqlite::Result<Option<String>> {
        Ok(acc.and_then(|state| state.finalize()))
    }
}

/// Register all custom functions on `conn`.
pub fn register(conn: &Connection) -> Result<()> {
    conn.create_aggregate_function(
        "shortest_id",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        ShortestIdAggregate,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_grows_monotonically() {
        let new_id = "abcdef0123456789beef";
        let mut state = ShortestId::default();

        state.step("1bcdef0123456789beef", new_id);
        assert_eq!(state.finalize().as_deref(), Some("#a"));
        state.step("ab1def0123456789beef", new_id);
        assert_eq!(state.finalize().as_deref(), Some("#abc"));
        state.step("abc1ef0123456789beef", new_id);
        assert_eq!(state.finalize().as_deref(), Some("#abcd"));
        state.step("abcdef0123456789bee1", new_id);
        assert_eq!(state.finalize().as_deref(), Some("#abcdef0123456789beef"));
    }

    #[test]
    fn test_shorter_difference_does_not_shrink() {
        let mut state = ShortestId::default();
        state.step("aaab", "aaaa");
        state.step("baaa", "aaaa");
        assert_eq!(state.finalize().as_deref(), Some("#aaaa"));
    }

    #[test]
    fn test_identical_id_yields_nothing() {
        let mut state = ShortestId::default();
        state.step("abcd", "abcd");
        assert_eq!(state.finalize(), None);
    }

    #[test]
    fn test_shortest_unique_id_fallback() {
        assert_eq!(shortest_unique_id("f00d", []), "#f");
        assert_eq!(shortest_unique_id("aaaa2222", ["aaaa1111"]), "#aaaa2");
    }

    #[test]
    fn test_sibling_ids_under_one_name() {
        let ids = ["aaaa1111", "aaaa2222", "bbbb3333"];
        let short = |id: &str| shortest_unique_id(id, ids.iter().copied().filter(|o| *o != id));
        assert_eq!(short("aaaa1111"), "#aaaa1");
        assert_eq!(short("aaaa2222"), "#aaaa2");
        assert_eq!(short("bbbb3333"), "#b");

        // Against bbbb3333 alone one character is enough.
        assert_eq!(shortest_unique_id("aaaa1111", ["bbbb3333"]), "#a");
    }

    #[test]
    fn test_sibling_ids_through_aggregate() {
        let conn = Connection::open_in_memory().expect("open");
        register(&conn).expect("register");
        conn.execute_batch(
            "CREATE TABLE ids (claim_id TEXT);
             INSERT INTO ids VALUES ('aaaa1111'), ('aaaa2222'), ('bbbb3333');",
        )
        .expect("seed");

        let mut stmt = conn
            .prepare(
                "SELECT COALESCE(
                    (SELECT shortest_id(claim_id, ?1) FROM ids WHERE claim_id != ?1),
                    '#' || substr(?1, 1, 1))",
            )
            .expect("prepare");
        for (id, expected) in [
            ("aaaa1111", "#aaaa1"),
            ("aaaa2222", "#aaaa2"),
            ("bbbb3333", "#b"),
        ] {
            let short: String = stmt.query_row([id], |row| row.get(0)).expect("query");
            assert_eq!(short, expected, "short id of {id}");
        }
    }

    #[test]
    fn test_aggregate_in_sql() {
        let conn = Connection::open_in_memory().expect("open");
        register(&conn).expect("register");
        conn.execute_batch(
            "CREATE TABLE ids (claim_id TEXT);
             INSERT INTO ids VALUES ('aaaa1111'), ('abcd0000');",
        )
        .expect("seed");

        let short: String = conn
            .query_row(
                "SELECT COALESCE(
                    (SELECT shortest_id(claim_id, ?1) FROM ids),
                    '#' || substr(?1, 1, 1))",
                ["aaaa2222"],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(short, "#aaaa2");

        let fallback: String = conn
            .query_row(
                "SELECT COALESCE(
                    (SELECT shortest_id(claim_id, ?1) FROM ids WHERE claim_id = 'none'),
                    '#' || substr(?1, 1, 1))",
                ["beef"],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(fallback, "#b");
    }
}
