//! Placeholder expansion for URLs, headers and request bodies.
//!
//! Expansion is a single left-to-right pass: each `{{...}}` token is resolved
//! at most once and its replacement is never re-scanned, so values containing
//! braces cannot trigger further substitution. Unrecognized tokens pass
//! through verbatim and expansion never fails; malformed arguments degrade to
//! fixed fallbacks.

use rand::Rng;

use crate::credentials::Credentials;

/// Sample list backing `{{pick movies}}`.
const MOVIES: [&str; 5] = ["movie1", "movie2", "movie3", "movie4", "movie5"];

/// Per-request expansion inputs. The random source is passed into
/// [`expand`] separately so the worker's rng can be borrowed mutably.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// 1-based worker id.
    pub user_id: u64,
    pub credentials: Option<&'a Credentials>,
}

/// Expand every placeholder in `template` against the current wall clock.
pub fn expand(template: &str, ctx: &Context<'_>, rng: &mut impl Rng) -> String {
    expand_at(template, ctx, rng, epoch_ms())
}

/// Like [`expand`] with the `{{epochms}}` value injected, so callers with a
/// fixed clock get fully deterministic output.
pub fn expand_at(template: &str, ctx: &Context<'_>, rng: &mut impl Rng, epoch_ms: u64) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated token, keep the tail as-is.
            break;
        };
        out.push_str(&rest[..start]);
        let token = &after[..end];
        match resolve(token, ctx, rng, epoch_ms) {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("{{");
                out.push_str(token);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Resolve a single token body (the text between the braces). `None` means
/// the token is not recognized and must be kept verbatim.
fn resolve(token: &str, ctx: &Context<'_>, rng: &mut impl Rng, epoch_ms: u64) -> Option<String> {
    let mut words = token.split_whitespace();
    let name = words.next()?;
    let args: Vec<&str> = words.collect();

    match (name, args.as_slice()) {
        ("userId", []) => Some(ctx.user_id.to_string()),
        ("epochms", []) => Some(epoch_ms.to_string()),
        ("randInt", args) => Some(rand_in_range(args, rng, "1")),
        ("randDelay", args) => Some(rand_in_range(args, rng, "1000")),
        ("pick", ["movies"]) => Some(MOVIES[rng.gen_range(0..MOVIES.len())].to_string()),
        ("username", []) | ("email", []) => {
            ctx.credentials.map(|c| c.username.clone())
        }
        ("password", []) => ctx.credentials.map(|c| c.password.clone()),
        _ => None,
    }
}

/// Uniform integer in `[a, b]`; any malformed input (wrong arity, unparsable
/// bounds, `a >= b`) yields the fallback literal.
fn rand_in_range(args: &[&str], rng: &mut impl Rng, fallback: &str) -> String {
    if let [a, b] = args {
        if let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) {
            if b > a {
                return rng.gen_range(a..=b).to_string();
            }
        }
    }
    fallback.to_string()
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const NOW: u64 = 1_700_000_000_000;

    fn ctx() -> Context<'static> {
        Context {
            user_id: 7,
            credentials: None,
        }
    }

    #[test]
    fn expands_user_id_and_epoch() {
        let mut rng = SmallRng::seed_from_u64(0);
        let out = expand_at("/u/{{userId}}?t={{epochms}}", &ctx(), &mut rng, NOW);
        assert_eq!(out, format!("/u/7?t={NOW}"));
    }

    #[test]
    fn deterministic_with_seeded_rng() {
        let template = "{{randInt 1 100}}-{{randDelay 10 20}}-{{pick movies}}";
        let a = expand_at(template, &ctx(), &mut SmallRng::seed_from_u64(42), NOW);
        let b = expand_at(template, &ctx(), &mut SmallRng::seed_from_u64(42), NOW);
        assert_eq!(a, b);
    }

    #[test]
    fn rand_int_stays_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..200 {
            let out = expand_at("{{randInt 5 10}}", &ctx(), &mut rng, NOW);
            let n: i64 = out.parse().unwrap();
            assert!((5..=10).contains(&n), "{n} out of range");
        }
    }

    #[test]
    fn rand_int_malformed_falls_back_to_one() {
        let mut rng = SmallRng::seed_from_u64(0);
        for template in [
            "{{randInt}}",
            "{{randInt 5}}",
            "{{randInt x y}}",
            "{{randInt 10 5}}",
            "{{randInt 5 5}}",
        ] {
            assert_eq!(expand_at(template, &ctx(), &mut rng, NOW), "1");
        }
    }

    #[test]
    fn rand_delay_falls_back_to_a_second() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(expand_at("{{randDelay 9 2}}", &ctx(), &mut rng, NOW), "1000");
        let out = expand_at("{{randDelay 100 200}}", &ctx(), &mut rng, NOW);
        let n: i64 = out.parse().unwrap();
        assert!((100..=200).contains(&n));
    }

    #[test]
    fn pick_movies_chooses_from_sample_list() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..20 {
            let out = expand_at("{{pick movies}}", &ctx(), &mut rng, NOW);
            assert!(MOVIES.contains(&out.as_str()));
        }
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            expand_at("a {{mystery}} b {{pick books}} c", &ctx(), &mut rng, NOW),
            "a {{mystery}} b {{pick books}} c"
        );
        assert_eq!(expand_at("open {{brace", &ctx(), &mut rng, NOW), "open {{brace");
    }

    #[test]
    fn credentials_expand_when_present() {
        let creds = Credentials {
            username: "a@x".into(),
            password: "pw1".into(),
        };
        let ctx = Context {
            user_id: 1,
            credentials: Some(&creds),
        };
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            expand_at(
                "u={{username}}&e={{email}}&p={{password}}",
                &ctx,
                &mut rng,
                NOW
            ),
            "u=a@x&e=a@x&p=pw1"
        );
    }

    #[test]
    fn credentials_stay_intact_without_pool() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            expand_at("u={{username}}", &ctx(), &mut rng, NOW),
            "u={{username}}"
        );
    }

    #[test]
    fn expansion_is_not_rescanned() {
        let creds = Credentials {
            username: "{{userId}}".into(),
            password: "pw".into(),
        };
        let ctx = Context {
            user_id: 9,
            credentials: Some(&creds),
        };
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(expand_at("{{username}}", &ctx, &mut rng, NOW), "{{userId}}");
    }
}
