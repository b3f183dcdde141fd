//! Redis-backed job store.
//!
//! Layout under the configured prefix:
//!
//! - `job:{id}`: job record as JSON
//! - `seq`: enqueue counter
//! - `{queue}:wait`: due jobs, scored `priority * 2^32 + seq`
//! - `{queue}:delayed`: jobs not yet due, scored by due time (ms)
//! - `{queue}:score`: hash of wait scores for delayed jobs
//! - `{queue}:active`: claimed jobs, scored by claim time (ms)
//! - `{queue}:holder`: hash of claimed job ID to the worker holding it
//! - `{queue}:completed`, `{queue}:failed`: finished jobs, scored by finish time (ms)
//!
//! Every write to a claimed job runs as a script that first checks
//! `{queue}:holder`, so a worker whose job was reclaimed cannot overwrite
//! or move it.

use super::{JobStore, StaleRecovery};
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobState, STALLED_ERROR};
use crate::metrics::RedisMetrics;
use crate::queue::QueueName;
use crate::stats::JobCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script, ScriptInvocation};
use resume_config::RedisConfig;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Moves due delayed jobs into the wait set, then pops the best waiting job
/// into the active set under `worker`.
///
/// KEYS: wait, delayed, score, active, holder. ARGV: now (ms), worker.
const CLAIM_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for _, id in ipairs(due) do
  local score = redis.call('HGET', KEYS[3], id)
  if score then
    redis.call('ZADD', KEYS[1], score, id)
  end
  redis.call('ZREM', KEYS[2], id)
end
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then
  return false
end
local id = popped[1]
redis.call('HDEL', KEYS[3], id)
redis.call('ZADD', KEYS[4], now, id)
redis.call('HSET', KEYS[5], id, ARGV[2])
return id
";

/// Rewrites the record of a job still held by `worker`.
///
/// KEYS: holder, job. ARGV: id, worker, record.
const SAVE_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[2], ARGV[3])
return 1
";

/// Moves a job held by `worker` into a finished set.
///
/// KEYS: holder, job, active, finished. ARGV: id, worker, record, finished (ms).
const FINISH_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[2], ARGV[3])
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
redis.call('ZADD', KEYS[4], ARGV[4], ARGV[1])
return 1
";

/// Moves a job held by `worker` back to the delayed set.
///
/// KEYS: holder, job, active, score, delayed.
/// ARGV: id, worker, record, wait score, run at (ms).
const REQUEUE_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[2], ARGV[3])
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
redis.call('HSET', KEYS[4], ARGV[1], ARGV[4])
redis.call('ZADD', KEYS[5], ARGV[5], ARGV[1])
return 1
";

/// Create a Redis connection pool.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("Creating Redis connection pool for job queue...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(config.connect_timeout()))
        .create_timeout(Some(config.connect_timeout()))
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder for the job store.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Job record key.
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Enqueue sequence counter.
    pub fn seq(&self) -> String {
        format!("{}:seq", self.prefix)
    }

    pub fn wait(&self, queue: QueueName) -> String {
        format!("{}:{}:wait", self.prefix, queue)
    }

    pub fn delayed(&self, queue: QueueName) -> String {
        format!("{}:{}:delayed", self.prefix, queue)
    }

    pub fn score(&self, queue: QueueName) -> String {
        format!("{}:{}:score", self.prefix, queue)
    }

    pub fn active(&self, queue: QueueName) -> String {
        format!("{}:{}:active", self.prefix, queue)
    }

    pub fn holder(&self, queue: QueueName) -> String {
        format!("{}:{}:holder", self.prefix, queue)
    }

    pub fn completed(&self, queue: QueueName) -> String {
        format!("{}:{}:completed", self.prefix, queue)
    }

    pub fn failed(&self, queue: QueueName) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    fn finished(&self, queue: QueueName, state: JobState) -> String {
        match state {
            JobState::Failed => self.failed(queue),
            _ => self.completed(queue),
        }
    }
}

fn wait_score(priority: u32, seq: u64) -> u64 {
    (u64::from(priority) << 32) + seq
}

fn not_held(worker_id: &str) -> JobError {
    JobError::InvalidState {
        expected: format!("active on {}", worker_id),
        actual: "reclaimed".to_string(),
    }
}

/// Redis-backed job store.
pub struct RedisJobStore {
    pool: Pool,
    keys: RedisKeys,
    claim_script: Script,
    save_script: Script,
    finish_script: Script,
    requeue_script: Script,
}

impl RedisJobStore {
    /// Create a new Redis job store.
    pub fn new(pool: Pool, key_prefix: &str) -> Self {
        Self {
            pool,
            keys: RedisKeys::new(key_prefix),
            claim_script: Script::new(CLAIM_SCRIPT),
            save_script: Script::new(SAVE_SCRIPT),
            finish_script: Script::new(FINISH_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        }
    }

    /// Connect using the given configuration.
    pub async fn connect(config: &RedisConfig) -> JobResult<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool, &config.key_prefix))
    }

    /// Key builder in use.
    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn load(&self, conn: &mut Connection, id: &JobId) -> JobResult<Job> {
        let json: Option<String> = conn.get(self.keys.job(id.as_str())).await?;
        match json {
            Some(json) => Job::from_json(&json),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    /// Loads a job and checks that `worker_id` holds it. The scripts repeat
    /// the check atomically when writing.
    async fn load_held(
        &self,
        conn: &mut Connection,
        id: &JobId,
        worker_id: &str,
    ) -> JobResult<Job> {
        let job = self.load(conn, id).await?;
        job.ensure_held_by(worker_id)?;
        Ok(job)
    }

    async fn run_guarded(
        &self,
        conn: &mut Connection,
        invocation: &ScriptInvocation<'_>,
        worker_id: &str,
    ) -> JobResult<()> {
        let held: i64 = invocation.invoke_async(&mut **conn).await?;
        if held == 1 {
            Ok(())
        } else {
            Err(not_held(worker_id))
        }
    }

    async fn save_held(&self, conn: &mut Connection, job: &Job, worker_id: &str) -> JobResult<()> {
        let id = job.id.as_str();
        let mut invocation = self.save_script.prepare_invoke();
        invocation
            .key(self.keys.holder(job.queue_name))
            .key(self.keys.job(id))
            .arg(id)
            .arg(worker_id)
            .arg(job.to_json()?);
        self.run_guarded(conn, &invocation, worker_id).await
    }

    async fn finish_held(
        &self,
        conn: &mut Connection,
        job: &Job,
        worker_id: &str,
        retain: usize,
    ) -> JobResult<()> {
        let id = job.id.as_str();
        let queue = job.queue_name;
        let key = self.keys.finished(queue, job.state);
        let finished_ms = job.finished_at.unwrap_or_else(Utc::now).timestamp_millis();

        let mut invocation = self.finish_script.prepare_invoke();
        invocation
            .key(self.keys.holder(queue))
            .key(self.keys.job(id))
            .key(self.keys.active(queue))
            .key(&key)
            .arg(id)
            .arg(worker_id)
            .arg(job.to_json()?)
            .arg(finished_ms);
        self.run_guarded(conn, &invocation, worker_id).await?;

        self.trim(conn, &key, retain).await
    }

    async fn requeue_held(
        &self,
        conn: &mut Connection,
        job: &Job,
        worker_id: &str,
        run_at: DateTime<Utc>,
    ) -> JobResult<()> {
        let seq: u64 = conn.incr(self.keys.seq(), 1).await?;
        let id = job.id.as_str();
        let queue = job.queue_name;

        let mut invocation = self.requeue_script.prepare_invoke();
        invocation
            .key(self.keys.holder(queue))
            .key(self.keys.job(id))
            .key(self.keys.active(queue))
            .key(self.keys.score(queue))
            .key(self.keys.delayed(queue))
            .arg(id)
            .arg(worker_id)
            .arg(job.to_json()?)
            .arg(wait_score(job.priority, seq))
            .arg(run_at.timestamp_millis());
        self.run_guarded(conn, &invocation, worker_id).await
    }

    async fn trim(&self, conn: &mut Connection, key: &str, retain: usize) -> JobResult<()> {
        if retain == 0 {
            return Ok(());
        }
        let stop = -(isize::try_from(retain).unwrap_or(isize::MAX - 1) + 1);
        let evicted: Vec<String> = conn.zrange(key, 0, stop).await?;
        if evicted.is_empty() {
            return Ok(());
        }

        let job_keys: Vec<String> = evicted.iter().map(|id| self.keys.job(id)).collect();
        let _: () = redis::pipe()
            .atomic()
            .zrem(key, &evicted)
            .del(&job_keys)
            .query_async(&mut **conn)
            .await?;

        debug!(key = %key, count = evicted.len(), "Trimmed finished jobs");
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn push(&self, job: &Job) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let seq: u64 = conn.incr(self.keys.seq(), 1).await?;
        let queue = job.queue_name;
        let id = job.id.as_str();
        let score = wait_score(job.priority, seq);

        let mut pipe = redis::pipe();
        pipe.atomic().set(self.keys.job(id), job.to_json()?);

        if job.is_delayed(Utc::now()) {
            pipe.hset(self.keys.score(queue), id, score).zadd(
                self.keys.delayed(queue),
                id,
                job.delay_until.timestamp_millis(),
            );
        } else {
            pipe.zadd(self.keys.wait(queue), id, score);
        }

        let _: () = pipe.query_async(&mut *conn).await?;

        debug!(
            job_id = %job.id,
            queue = %queue,
            priority = job.priority,
            delay_until = %job.delay_until,
            "Stored job"
        );
        Ok(())
    }

    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        let started = Instant::now();
        let mut conn = self.conn().await?;

        let mut invocation = self.claim_script.prepare_invoke();
        invocation
            .key(self.keys.wait(queue))
            .key(self.keys.delayed(queue))
            .key(self.keys.score(queue))
            .key(self.keys.active(queue))
            .key(self.keys.holder(queue))
            .arg(now.timestamp_millis())
            .arg(worker_id);
        let claimed: Option<String> = invocation.invoke_async(&mut *conn).await?;

        let Some(id) = claimed else {
            return Ok(None);
        };
        let id = JobId::from(id);

        let mut job = match self.load(&mut conn, &id).await {
            Ok(job) => job,
            Err(JobError::NotFound(_)) => {
                // Index entry without a record; drop it
                warn!(job_id = %id, queue = %queue, "Claimed job has no record");
                let _: () = redis::pipe()
                    .atomic()
                    .zrem(self.keys.active(queue), id.as_str())
                    .hdel(self.keys.holder(queue), id.as_str())
                    .query_async(&mut *conn)
                    .await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        job.mark_active(worker_id, now);
        match self.save_held(&mut conn, &job, worker_id).await {
            Ok(()) => {}
            Err(JobError::InvalidState { .. }) => {
                warn!(job_id = %id, queue = %queue, "Claimed job was reclaimed before it started");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        RedisMetrics::operation_duration("claim", started.elapsed());
        Ok(Some(job))
    }

    async fn update_progress(&self, id: &JobId, worker_id: &str, progress: u8) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let mut job = self.load_held(&mut conn, id, worker_id).await?;
        job.progress = progress;
        self.save_held(&mut conn, &job, worker_id).await
    }

    async fn complete(
        &self,
        id: &JobId,
        worker_id: &str,
        result: Option<Value>,
        retain: usize,
    ) -> JobResult<Job> {
        let mut conn = self.conn().await?;
        let mut job = self.load_held(&mut conn, id, worker_id).await?;
        job.mark_completed(result, Utc::now());
        self.finish_held(&mut conn, &job, worker_id, retain).await?;
        Ok(job)
    }

    async fn retry(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> JobResult<Job> {
        let mut conn = self.conn().await?;
        let mut job = self.load_held(&mut conn, id, worker_id).await?;
        job.mark_retrying(error, run_at);
        self.requeue_held(&mut conn, &job, worker_id, run_at).await?;
        Ok(job)
    }

    async fn fail(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        retain: usize,
    ) -> JobResult<Job> {
        let mut conn = self.conn().await?;
        let mut job = self.load_held(&mut conn, id, worker_id).await?;
        job.mark_failed(error, Utc::now());
        self.finish_held(&mut conn, &job, worker_id, retain).await?;
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> JobResult<Option<Job>> {
        let mut conn = self.conn().await?;
        match self.load(&mut conn, id).await {
            Ok(job) => Ok(Some(job)),
            Err(JobError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn counts(&self, queue: QueueName) -> JobResult<JobCounts> {
        let started = Instant::now();
        let mut conn = self.conn().await?;

        let (wait, delayed, active, completed, failed): (u64, u64, u64, u64, u64) = redis::pipe()
            .zcard(self.keys.wait(queue))
            .zcard(self.keys.delayed(queue))
            .zcard(self.keys.active(queue))
            .zcard(self.keys.completed(queue))
            .zcard(self.keys.failed(queue))
            .query_async(&mut *conn)
            .await?;

        RedisMetrics::operation_duration("counts", started.elapsed());
        Ok(JobCounts {
            waiting: wait + delayed,
            active,
            completed,
            failed,
        })
    }

    async fn recover_stale(
        &self,
        queue: QueueName,
        stalled_before: DateTime<Utc>,
        retain_failed: usize,
    ) -> JobResult<Vec<StaleRecovery>> {
        let mut conn = self.conn().await?;
        let active_key = self.keys.active(queue);

        let candidates: Vec<String> = conn
            .zrangebyscore(&active_key, "-inf", stalled_before.timestamp_millis())
            .await?;

        let mut recovered = Vec::new();
        for raw_id in candidates {
            let holder: Option<String> = conn.hget(self.keys.holder(queue), &raw_id).await?;
            let Some(holder) = holder else {
                continue;
            };

            let id = JobId::from(raw_id);
            let mut job = match self.load(&mut conn, &id).await {
                Ok(job) => job,
                Err(JobError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            // Reclaim as the holder; fails if the worker finished first
            let now = Utc::now();
            let outcome = if job.is_exhausted() {
                job.mark_failed(STALLED_ERROR, now);
                self.finish_held(&mut conn, &job, &holder, retain_failed)
                    .await
                    .map(|()| StaleRecovery::Failed(job))
            } else {
                job.mark_retrying(STALLED_ERROR, now);
                self.requeue_held(&mut conn, &job, &holder, now)
                    .await
                    .map(|()| StaleRecovery::Requeued(job))
            };

            match outcome {
                Ok(recovery) => recovered.push(recovery),
                Err(JobError::InvalidState { .. }) => {
                    debug!(job_id = %id, worker_id = %holder, "Stale job settled by its worker");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    async fn ping(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }
}
