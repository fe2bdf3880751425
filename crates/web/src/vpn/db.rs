//! VPN database schema and operations
//!
//! Tables:
//! - users: management accounts with salted password hashes
//! - peers: WireGuard peer records with assigned tunnel addresses
//! - servers: the tunnel endpoint records (one active at a time)

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use wgadmin_common::{Database, Error, Result};

/// VPN database wrapper
#[derive(Clone)]
pub struct VpnDb {
    db: Database,
}

// ============================================================================
// Record types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub ip_address: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_connected: Option<i64>,
    pub bytes_received: i64,
    pub bytes_sent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub endpoint: String,
    pub port: u16,
    pub is_active: bool,
    pub created_at: i64,
}

// ============================================================================
// Address allocation
// ============================================================================

/// Allocate the tunnel address for the next peer in the 10.0.0.0/24 pool.
///
/// `highest_id` is the highest peer id ever allocated (zero when no peer has
/// ever existed). Addresses ascend with creation order, starting at
/// 10.0.0.2, and a freed address is never handed out again: the nth peer
/// ever created receives 10.0.0.(n+1) regardless of deletions in between.
/// When the highest-id peer still exists this is exactly one past the last
/// octet of its address.
pub fn next_peer_address(highest_id: i64) -> Result<String> {
    let octet = highest_id.max(0) + 2;
    if octet > 254 {
        return Err(Error::AddressPoolExhausted("10.0.0.0/24".to_string()));
    }
    Ok(format!("10.0.0.{}", octet))
}

// ============================================================================
// Database implementation
// ============================================================================

impl VpnDb {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Initialize the VPN schema
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute_batch(
            r#"
            -- Management accounts
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

            -- WireGuard peers
            CREATE TABLE IF NOT EXISTS peers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                public_key TEXT NOT NULL,
                private_key TEXT NOT NULL,
                ip_address TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                last_connected INTEGER,
                bytes_received INTEGER NOT NULL DEFAULT 0,
                bytes_sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_peers_name ON peers(name);

            -- Tunnel endpoint records
            CREATE TABLE IF NOT EXISTS servers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                public_key TEXT NOT NULL,
                private_key TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                port INTEGER NOT NULL DEFAULT 51820,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );
            "#,
        )?;

        info!("VPN database schema initialized");
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<UserRecord> {
        let now = now_epoch_secs();
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, is_admin, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, email, password_hash, is_admin, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(UserRecord {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            created_at: now,
            last_login: None,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, is_admin, created_at, last_login \
                 FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                        is_admin: row.get(4)?,
                        created_at: row.get(5)?,
                        last_login: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, is_admin, created_at, last_login \
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                        is_admin: row.get(4)?,
                        created_at: row.get(5)?,
                        last_login: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        let now = now_epoch_secs();
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    pub fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        Ok(())
    }

    pub fn count_users(&self) -> Result<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // Peer operations
    // ========================================================================

    /// Create a peer, assigning the next free tunnel address.
    ///
    /// The duplicate-name check, the highest-id lookup, and the insert all
    /// run under one acquisition of the connection mutex, so two concurrent
    /// creations cannot compute the same address.
    pub fn create_peer(
        &self,
        name: &str,
        public_key: &str,
        private_key: &str,
    ) -> Result<PeerRecord> {
        let now = now_epoch_secs();
        let conn = self.db.connection();
        let conn = conn.lock();

        let existing: Option<i64> = conn
            .query_row("SELECT id FROM peers WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            return Err(Error::AlreadyExists {
                kind: "peer".to_string(),
                id: name.to_string(),
            });
        }

        let highest = match conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'peers'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        {
            Ok(Some(seq)) => seq,
            Ok(None) => 0,
            // sqlite_sequence does not exist until the first AUTOINCREMENT
            // insert anywhere in the database
            Err(ref e) if e.to_string().contains("no such table") => 0,
            Err(e) => return Err(e.into()),
        };
        let ip_address = next_peer_address(highest)?;

        conn.execute(
            "INSERT INTO peers (name, public_key, private_key, ip_address, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![name, public_key, private_key, ip_address, now],
        )?;
        let id = conn.last_insert_rowid();

        info!("Created peer {} at {}", name, ip_address);

        Ok(PeerRecord {
            id,
            name: name.to_string(),
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
            ip_address,
            is_active: true,
            created_at: now,
            last_connected: None,
            bytes_received: 0,
            bytes_sent: 0,
        })
    }

    pub fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, public_key, private_key, ip_address, is_active, created_at, \
                    last_connected, bytes_received, bytes_sent \
             FROM peers ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(PeerRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                public_key: row.get(2)?,
                private_key: row.get(3)?,
                ip_address: row.get(4)?,
                is_active: row.get(5)?,
                created_at: row.get(6)?,
                last_connected: row.get(7)?,
                bytes_received: row.get(8)?,
                bytes_sent: row.get(9)?,
            })
        })?;

        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }

    pub fn get_peer(&self, id: i64) -> Result<Option<PeerRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let peer = conn
            .query_row(
                "SELECT id, name, public_key, private_key, ip_address, is_active, created_at, \
                        last_connected, bytes_received, bytes_sent \
                 FROM peers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PeerRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        public_key: row.get(2)?,
                        private_key: row.get(3)?,
                        ip_address: row.get(4)?,
                        is_active: row.get(5)?,
                        created_at: row.get(6)?,
                        last_connected: row.get(7)?,
                        bytes_received: row.get(8)?,
                        bytes_sent: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(peer)
    }

    /// Delete a peer. Returns false when no such peer exists.
    pub fn delete_peer(&self, id: i64) -> Result<bool> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let deleted = conn.execute("DELETE FROM peers WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn count_peers(&self) -> Result<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // Server operations
    // ========================================================================

    pub fn create_server(
        &self,
        name: &str,
        public_key: &str,
        private_key: &str,
        endpoint: &str,
        port: u16,
    ) -> Result<ServerRecord> {
        let now = now_epoch_secs();
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO servers (name, public_key, private_key, endpoint, port, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![name, public_key, private_key, endpoint, port, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(ServerRecord {
            id,
            name: name.to_string(),
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
            endpoint: endpoint.to_string(),
            port,
            is_active: true,
            created_at: now,
        })
    }

    /// The first active server record, if any. Config rendering treats
    /// absence as a hard error.
    pub fn active_server(&self) -> Result<Option<ServerRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let server = conn
            .query_row(
                "SELECT id, name, public_key, private_key, endpoint, port, is_active, created_at \
                 FROM servers WHERE is_active = 1 ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(ServerRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        public_key: row.get(2)?,
                        private_key: row.get(3)?,
                        endpoint: row.get(4)?,
                        port: row.get(5)?,
                        is_active: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(server)
    }

    pub fn count_servers(&self) -> Result<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> VpnDb {
        let db = Database::open_memory().unwrap();
        let vdb = VpnDb::new(db);
        vdb.init_schema().unwrap();
        vdb
    }

    #[test]
    fn test_next_peer_address() {
        assert_eq!(next_peer_address(0).unwrap(), "10.0.0.2");
        assert_eq!(next_peer_address(1).unwrap(), "10.0.0.3");
        assert_eq!(next_peer_address(98).unwrap(), "10.0.0.100");
        assert_eq!(next_peer_address(252).unwrap(), "10.0.0.254");
    }

    #[test]
    fn test_next_peer_address_pool_exhausted() {
        let err = next_peer_address(253).unwrap_err();
        assert!(matches!(err, Error::AddressPoolExhausted(_)));
    }

    #[test]
    fn test_user_crud() {
        let db = test_db();
        let user = db.create_user("admin", "admin@vpn.local", "hash", true).unwrap();
        assert!(user.is_admin);
        assert!(user.last_login.is_none());

        let fetched = db.get_user_by_username("admin").unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.email, "admin@vpn.local");

        db.touch_last_login(user.id).unwrap();
        let fetched = db.get_user(user.id).unwrap().unwrap();
        assert!(fetched.last_login.is_some());

        db.set_password(user.id, "newhash").unwrap();
        let fetched = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(fetched.password_hash, "newhash");
    }

    #[test]
    fn test_peer_addresses_sequential() {
        let db = test_db();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let peer = db.create_peer(name, "pub", "priv").unwrap();
            assert_eq!(peer.ip_address, format!("10.0.0.{}", i + 2));
        }
    }

    #[test]
    fn test_no_address_reuse_after_delete() {
        let db = test_db();
        let a = db.create_peer("a", "pub-a", "priv-a").unwrap();
        let b = db.create_peer("b", "pub-b", "priv-b").unwrap();
        assert_eq!(a.ip_address, "10.0.0.2");
        assert_eq!(b.ip_address, "10.0.0.3");

        assert!(db.delete_peer(b.id).unwrap());

        let c = db.create_peer("c", "pub-c", "priv-c").unwrap();
        assert_eq!(c.ip_address, "10.0.0.4");
    }

    #[test]
    fn test_duplicate_peer_name() {
        let db = test_db();
        db.create_peer("laptop", "pub", "priv").unwrap();
        let err = db.create_peer("laptop", "pub2", "priv2").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_delete_missing_peer() {
        let db = test_db();
        assert!(!db.delete_peer(42).unwrap());
    }

    #[test]
    fn test_active_server() {
        let db = test_db();
        assert!(db.active_server().unwrap().is_none());

        db.create_server("default-server", "srv-pub", "srv-priv", "vpn.example.com", 51820)
            .unwrap();
        let server = db.active_server().unwrap().unwrap();
        assert_eq!(server.endpoint, "vpn.example.com");
        assert_eq!(server.port, 51820);
    }
}
