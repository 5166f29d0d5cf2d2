//! # Command Dispatch
//!
//! Purpose: Map each supported command name to its handler, validate
//! arity up front, and translate `Keyspace`/engine results into wire
//! replies. Dispatch is a name lookup into a static table rather than a
//! chain of per-command method calls, so adding a command never means
//! widening a shared trait.
//!
//! ## Design Principles
//!
//! 1. **Table Dispatch**: Commands are matched by uppercased name once, not
//!    re-derived per handler.
//! 2. **Arity-First**: Each handler checks argument count before touching
//!    the keyspace, so a malformed call never partially mutates state.
//! 3. **One Error Taxonomy**: Every failure path funnels through `HkvError`
//!    so the wire prefix (`ERR`/`WRONGTYPE`) is never chosen ad hoc.

use std::sync::Arc;

use hkv_common::HkvError;
use hkv_engine::{ExpirationTimers, Keyspace, SnapshotEngine, TtlStatus};

use crate::protocol::Reply;

/// Shared state every connection's dispatcher reads and mutates.
pub struct ServerContext {
    pub keyspace: Arc<Keyspace>,
    pub timers: Arc<ExpirationTimers>,
    pub snapshot: Arc<SnapshotEngine>,
}

/// Parses and executes a single command, returning the reply to send back.
pub fn dispatch(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.is_empty() {
        return client_error(&HkvError::SyntaxError);
    }

    let name = match std::str::from_utf8(&args[0]) {
        Ok(name) => name.to_ascii_uppercase(),
        Err(_) => return client_error(&HkvError::SyntaxError),
    };

    match name.as_str() {
        "KEYS" => keys(args, ctx),
        "DEL" => del(args, ctx),
        "TYPE" => type_of(args, ctx),
        "EXPIRE" => expire(args, ctx),
        "PERSIST" => persist(args, ctx),
        "TTL" => ttl(args, ctx),
        "SET" => set(args, ctx),
        "MSET" => mset(args, ctx),
        "GET" => get(args, ctx),
        "MGET" => mget(args, ctx),
        "HSET" | "HMSET" => hset(&name, args, ctx),
        "HGET" => hget(args, ctx, false),
        "HMGET" => hget(args, ctx, true),
        "HLEN" => hlen(args, ctx),
        "HKEYS" => hkeys(args, ctx),
        "HGETALL" => hgetall(args, ctx),
        "LPUSH" => lpush(args, ctx),
        "RPUSH" => rpush(args, ctx),
        "LPOP" => lpop(args, ctx),
        "RPOP" => rpop(args, ctx),
        "LLEN" => llen(args, ctx),
        "LINDEX" => lindex(args, ctx),
        "LSET" => lset(args, ctx),
        "SADD" => sadd(args, ctx),
        "SREM" => srem(args, ctx),
        "SPOP" => spop(args, ctx),
        "SCARD" => scard(args, ctx),
        "SMEMBERS" => smembers(args, ctx),
        "SAVE" => save(args, ctx),
        "BGSAVE" => bgsave(args, ctx),
        other => client_error(&HkvError::UnknownCommand(other.to_string())),
    }
}

fn client_error(err: &HkvError) -> Reply {
    let prefix = match err.category() {
        hkv_common::HkvErrorCategory::WrongType => "WRONGTYPE",
        _ => "ERR",
    };
    Reply::Error {
        prefix,
        message: err.to_string(),
    }
}

fn arg_str(args: &[Vec<u8>], idx: usize) -> Result<String, Reply> {
    std::str::from_utf8(&args[idx])
        .map(str::to_string)
        .map_err(|_| client_error(&HkvError::SyntaxError))
}

fn arg_strs(args: &[Vec<u8>], from: usize) -> Result<Vec<String>, Reply> {
    args[from..].iter().map(|a| {
        std::str::from_utf8(a)
            .map(str::to_string)
            .map_err(|_| client_error(&HkvError::SyntaxError))
    }).collect()
}

fn arg_i64(args: &[Vec<u8>], idx: usize) -> Result<i64, Reply> {
    let text = arg_str(args, idx)?;
    text.parse::<i64>().map_err(|_| client_error(&HkvError::NotAnInteger))
}

fn wrong_arity(name: &str) -> Reply {
    client_error(&HkvError::WrongArity(name.to_string()))
}

fn from_result<T>(result: Result<T, HkvError>, ok: impl FnOnce(T) -> Reply) -> Reply {
    match result {
        Ok(value) => ok(value),
        Err(err) => client_error(&err),
    }
}

// ---- generic --------------------------------------------------------------

fn keys(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("KEYS");
    }
    let pattern = match arg_str(args, 1) {
        Ok(p) => p,
        Err(e) => return e,
    };
    Reply::array_of_strings(ctx.keyspace.keys(&pattern))
}

fn del(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 2 {
        return wrong_arity("DEL");
    }
    let keys = match arg_strs(args, 1) {
        Ok(k) => k,
        Err(e) => return e,
    };
    for key in &keys {
        ctx.timers.cancel(key);
    }
    Reply::Integer(ctx.keyspace.del(&keys))
}

fn type_of(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("TYPE");
    }
    let key = match arg_str(args, 1) {
        Ok(k) => k,
        Err(e) => return e,
    };
    Reply::Simple(ctx.keyspace.type_of(&key))
}

fn expire(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 3 {
        return wrong_arity("EXPIRE");
    }
    let key = match arg_str(args, 1) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let seconds = match arg_i64(args, 2) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if ctx.keyspace.set_expire(&key, seconds) {
        let deadline = ctx.keyspace.current_deadline(&key).expect("just set");
        ctx.timers.install(&key, deadline);
        Reply::Integer(1)
    } else {
        Reply::Integer(0)
    }
}

fn persist(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("PERSIST");
    }
    let key = match arg_str(args, 1) {
        Ok(k) => k,
        Err(e) => return e,
    };
    if ctx.keyspace.persist(&key) {
        ctx.timers.cancel(&key);
        Reply::Integer(1)
    } else {
        Reply::Integer(0)
    }
}

fn ttl(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("TTL");
    }
    let key = match arg_str(args, 1) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match ctx.keyspace.ttl(&key) {
        TtlStatus::Missing => Reply::Integer(-2),
        TtlStatus::NoExpiry => Reply::Integer(-1),
        TtlStatus::Remaining(secs) => Reply::Integer(secs),
    }
}

// ---- strings ----------------------------------------------------------------

fn set(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() == 3 {
        let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
        let value = match arg_str(args, 2) { Ok(v) => v, Err(e) => return e };
        ctx.timers.cancel(&key);
        ctx.keyspace.set_string(key, value, None);
        return Reply::ok();
    }
    if args.len() == 5 {
        let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
        let value = match arg_str(args, 2) { Ok(v) => v, Err(e) => return e };
        let option = match arg_str(args, 3) { Ok(o) => o, Err(e) => return e };
        if !option.eq_ignore_ascii_case("EX") {
            return client_error(&HkvError::SyntaxError);
        }
        let seconds = match arg_i64(args, 4) { Ok(s) => s, Err(e) => return e };
        ctx.timers.cancel(&key);
        ctx.keyspace.set_string(key.clone(), value, Some(seconds));
        let deadline = ctx.keyspace.current_deadline(&key).expect("just set");
        ctx.timers.install(&key, deadline);
        return Reply::ok();
    }
    wrong_arity("SET")
}

fn mset(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 3 || args.len() % 2 == 0 {
        return wrong_arity("MSET");
    }
    let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
    let mut idx = 1;
    while idx < args.len() {
        let key = match arg_str(args, idx) { Ok(k) => k, Err(e) => return e };
        let value = match arg_str(args, idx + 1) { Ok(v) => v, Err(e) => return e };
        ctx.timers.cancel(&key);
        pairs.push((key, value));
        idx += 2;
    }
    ctx.keyspace.mset(pairs);
    Reply::ok()
}

fn get(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("GET");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.get_string(&key), |v| match v {
        Some(s) => Reply::bulk(s),
        None => Reply::nil(),
    })
}

fn mget(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 2 {
        return wrong_arity("MGET");
    }
    let keys = match arg_strs(args, 1) { Ok(k) => k, Err(e) => return e };
    Reply::array_of_optional_strings(ctx.keyspace.mget(&keys))
}

// ---- hashes -------------------------------------------------------------------

fn hset(name: &str, args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 4 || args.len() % 2 != 0 {
        return wrong_arity(name);
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let mut fields = Vec::with_capacity((args.len() - 2) / 2);
    let mut idx = 2;
    while idx < args.len() {
        let field = match arg_str(args, idx) { Ok(f) => f, Err(e) => return e };
        let value = match arg_str(args, idx + 1) { Ok(v) => v, Err(e) => return e };
        fields.push((field, value));
        idx += 2;
    }
    let added = fields.len() as i64;
    from_result(ctx.keyspace.hset(&key, fields), |_| Reply::Integer(added))
}

fn hget(args: &[Vec<u8>], ctx: &ServerContext, multi: bool) -> Reply {
    let name = if multi { "HMGET" } else { "HGET" };
    if args.len() < 3 {
        return wrong_arity(name);
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let fields = match arg_strs(args, 2) { Ok(f) => f, Err(e) => return e };
    if !multi && fields.len() != 1 {
        return wrong_arity(name);
    }
    from_result(ctx.keyspace.hget(&key, &fields), |mut values| {
        if multi {
            Reply::array_of_optional_strings(values)
        } else {
            match values.pop() {
                Some(Some(v)) => Reply::bulk(v),
                _ => Reply::nil(),
            }
        }
    })
}

fn hlen(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("HLEN");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.hlen(&key), Reply::Integer)
}

fn hkeys(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("HKEYS");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.hkeys(&key), Reply::array_of_strings)
}

fn hgetall(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("HGETALL");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.hgetall(&key), |pairs| {
        Reply::array_of_strings(pairs.into_iter().flat_map(|(f, v)| [f, v]))
    })
}

// ---- lists --------------------------------------------------------------------

fn lpush(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 3 {
        return wrong_arity("LPUSH");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let values = match arg_strs(args, 2) { Ok(v) => v, Err(e) => return e };
    from_result(ctx.keyspace.lpush(&key, values), Reply::Integer)
}

fn rpush(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 3 {
        return wrong_arity("RPUSH");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let values = match arg_strs(args, 2) { Ok(v) => v, Err(e) => return e };
    from_result(ctx.keyspace.rpush(&key, values), Reply::Integer)
}

fn lpop(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("LPOP");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.lpop(&key), |v| match v {
        Some(s) => Reply::bulk(s),
        None => Reply::nil(),
    })
}

fn rpop(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("RPOP");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.rpop(&key), |v| match v {
        Some(s) => Reply::bulk(s),
        None => Reply::nil(),
    })
}

fn llen(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("LLEN");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.llen(&key), Reply::Integer)
}

fn lindex(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 3 {
        return wrong_arity("LINDEX");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let index = match arg_i64(args, 2) { Ok(i) => i, Err(e) => return e };
    from_result(ctx.keyspace.lindex(&key, index), |v| match v {
        Some(s) => Reply::bulk(s),
        None => Reply::nil(),
    })
}

fn lset(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 4 {
        return wrong_arity("LSET");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let index = match arg_i64(args, 2) { Ok(i) => i, Err(e) => return e };
    let value = match arg_str(args, 3) { Ok(v) => v, Err(e) => return e };
    from_result(ctx.keyspace.lset(&key, index, value), |_| Reply::ok())
}

// ---- sets ---------------------------------------------------------------------

fn sadd(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 3 {
        return wrong_arity("SADD");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let members = match arg_strs(args, 2) { Ok(m) => m, Err(e) => return e };
    from_result(ctx.keyspace.sadd(&key, members), Reply::Integer)
}

fn srem(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() < 3 {
        return wrong_arity("SREM");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    let members = match arg_strs(args, 2) { Ok(m) => m, Err(e) => return e };
    from_result(ctx.keyspace.srem(&key, &members), Reply::Integer)
}

fn spop(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("SPOP");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.spop(&key), |v| match v {
        Some(s) => Reply::bulk(s),
        None => Reply::nil(),
    })
}

fn scard(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("SCARD");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.scard(&key), Reply::Integer)
}

fn smembers(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 2 {
        return wrong_arity("SMEMBERS");
    }
    let key = match arg_str(args, 1) { Ok(k) => k, Err(e) => return e };
    from_result(ctx.keyspace.smembers(&key), Reply::array_of_strings)
}

// ---- persistence --------------------------------------------------------------

fn save(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 1 {
        return wrong_arity("SAVE");
    }
    match ctx.snapshot.save(&ctx.keyspace) {
        Ok(()) => Reply::ok(),
        Err(err) => client_error(&err),
    }
}

fn bgsave(args: &[Vec<u8>], ctx: &ServerContext) -> Reply {
    if args.len() != 1 {
        return wrong_arity("BGSAVE");
    }
    ctx.snapshot.bgsave(&ctx.keyspace);
    Reply::Simple("Background saving started")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ServerContext {
        let keyspace = Arc::new(Keyspace::new());
        let timers = Arc::new(ExpirationTimers::new(Arc::clone(&keyspace)));
        let snapshot = Arc::new(SnapshotEngine::new(
            std::env::temp_dir().join("hkv-commands-test.pdb"),
        ));
        ServerContext { keyspace, timers, snapshot }
    }

    fn args(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn set_then_get_roundtrips() {
        let ctx = ctx();
        assert_eq!(dispatch(&args(&["SET", "a", "1"]), &ctx), Reply::ok());
        assert_eq!(dispatch(&args(&["GET", "a"]), &ctx), Reply::bulk("1"));
    }

    #[test]
    fn hget_on_string_key_is_wrongtype() {
        let ctx = ctx();
        dispatch(&args(&["SET", "a", "1"]), &ctx);
        let reply = dispatch(&args(&["HGET", "a", "f"]), &ctx);
        assert_eq!(
            reply,
            Reply::Error {
                prefix: "WRONGTYPE",
                message: "Operation against a key holding the wrong kind of value".to_string(),
            }
        );
    }

    #[test]
    fn unknown_command_is_client_error() {
        let ctx = ctx();
        let reply = dispatch(&args(&["NOPE"]), &ctx);
        assert_eq!(
            reply,
            Reply::Error { prefix: "ERR", message: "unknown command NOPE".to_string() }
        );
    }

    #[test]
    fn del_cancels_pending_expiration() {
        let ctx = ctx();
        dispatch(&args(&["SET", "a", "1"]), &ctx);
        dispatch(&args(&["EXPIRE", "a", "100"]), &ctx);
        assert_eq!(dispatch(&args(&["DEL", "a"]), &ctx), Reply::Integer(1));
        assert_eq!(dispatch(&args(&["TTL", "a"]), &ctx), Reply::Integer(-2));
    }

    #[test]
    fn keys_glob_matches_prefix() {
        let ctx = ctx();
        dispatch(&args(&["SET", "user:1", "a"]), &ctx);
        dispatch(&args(&["SET", "admin", "b"]), &ctx);
        let reply = dispatch(&args(&["KEYS", "user:*"]), &ctx);
        assert_eq!(reply, Reply::array_of_strings(["user:1".to_string()]));
    }
}
