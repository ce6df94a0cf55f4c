// entities.rs — entity string parsing and spawn point lookup

use log::{debug, info};

use crate::q_shared::Vec3;

/// Height of the player's eye above the spawn origin.
pub const EYE_HEIGHT: f32 = 56.0;

/// One `{ "key" "value" ... }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity<'a> {
    pub pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Entity<'a> {
    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|&(_, v)| v)
    }

    pub fn classname(&self) -> Option<&'a str> {
        self.get("classname")
    }
}

/// Splits the next token off `data`: a quoted string (quotes stripped) or a
/// run of non-whitespace. Skips whitespace and `//` comments. Returns `None`
/// at end of input.
pub fn com_parse(data: &str) -> Option<(&str, &str)> {
    let mut rest = data;
    loop {
        rest = rest.trim_start_matches(|c: char| c <= ' ' && c != '\0');
        if rest.is_empty() || rest.starts_with('\0') {
            return None;
        }
        if let Some(comment) = rest.strip_prefix("//") {
            rest = comment.find('\n').map_or("", |nl| &comment[nl..]);
            continue;
        }
        break;
    }

    if let Some(quoted) = rest.strip_prefix('"') {
        return Some(match quoted.find('"') {
            Some(end) => (&quoted[..end], &quoted[end + 1..]),
            None => (quoted, ""),
        });
    }

    let end = rest.find(|c: char| c <= ' ').unwrap_or(rest.len());
    Some((&rest[..end], &rest[end..]))
}

/// Parses every entity block. Parsing stops at the first malformed block;
/// the blocks before it are returned.
pub fn parse_entities(data: &str) -> Vec<Entity<'_>> {
    let mut entities = Vec::new();
    let mut rest = data;

    while let Some((token, after)) = com_parse(rest) {
        if token != "{" {
            debug!("entity string: expected '{{', found {:?}", token);
            break;
        }
        rest = after;

        let mut ent = Entity::default();
        loop {
            let Some((key, after)) = com_parse(rest) else {
                debug!("entity string: EOF without closing brace");
                return entities;
            };
            rest = after;
            if key == "}" {
                break;
            }
            let Some((value, after)) = com_parse(rest) else {
                debug!("entity string: EOF without value for {:?}", key);
                return entities;
            };
            rest = after;
            if value == "}" {
                debug!("entity string: closing brace without data");
                return entities;
            }
            ent.pairs.push((key, value));
        }
        entities.push(ent);
    }

    entities
}

/// Parses `"x y z"`. Missing components are zero, as with `sscanf`.
pub fn parse_vector(s: &str) -> Option<Vec3> {
    let mut out = [0.0f32; 3];
    let mut parts = s.split_whitespace();
    for (i, v) in out.iter_mut().enumerate() {
        match parts.next().map(str::parse::<f32>) {
            Some(Ok(f)) => *v = f,
            Some(Err(_)) => return None,
            None if i == 0 => return None,
            None => break,
        }
    }
    Some(out)
}

/// Eye position at the first `info_player_start`: its origin raised by
/// [`EYE_HEIGHT`].
pub fn find_player_start(entity_string: &str) -> Option<Vec3> {
    let ent = parse_entities(entity_string)
        .into_iter()
        .find(|e| e.classname() == Some("info_player_start"))?;
    let mut origin = parse_vector(ent.get("origin")?)?;
    origin[2] += EYE_HEIGHT;
    info!(
        "Camera at player start: {:.0} {:.0} {:.0}",
        origin[0], origin[1], origin[2]
    );
    Some(origin)
}
