use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::catalog::error::CatalogError;
use crate::catalog::repository::CatalogRepository;
use crate::catalog::types::{
    ArtifactRef, CatalogStats, ModuleId, ModuleKind, ModuleMetadata, Namespace, PublishRequest,
    VersionRecord, VersionStatus,
};
use crate::db::ReadPool;

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: lookup indexes for status filtering and provider discovery
    &[
        "CREATE INDEX IF NOT EXISTS idx_module_versions_status ON module_versions(status)",
        "CREATE INDEX IF NOT EXISTS idx_module_providers_kind ON module_providers(kind)",
    ],
    // v2: versions differing only in build metadata share a precedence key
    &[
        "ALTER TABLE module_versions ADD COLUMN precedence_key TEXT",
        "UPDATE module_versions SET precedence_key = CASE
            WHEN instr(version, '+') > 0 THEN substr(version, 1, instr(version, '+') - 1)
            ELSE version END",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_module_versions_precedence
            ON module_versions(module_provider_id, precedence_key)",
    ],
    // v3: provider checksum signing details as JSON
    &["ALTER TABLE module_versions ADD COLUMN signing TEXT"],
];

const VERSION_COLUMNS: &str = r#"
    v.version, v.status, v.artifact, v.published_at, v.description, v.owner,
    v.source_url, v.provider_logo, v.protocols, v.shasum, v.signing
"#;

/// Version string without build metadata
///
/// Two versions with the same key have equal precedence, so at most one of
/// them may exist per module.
pub(crate) fn precedence_key(version: &str) -> &str {
    version.split_once('+').map_or(version, |(core, _)| core)
}

/// SQLite-backed catalog repository
///
/// Writes go through one connection behind a mutex. Reads use pooled
/// read-only connections and never wait for a writer.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    readers: ReadPool,
}

impl SqliteCatalog {
    pub fn new(db_path: &Path) -> Result<Self, CatalogError> {
        info!("Initializing catalog database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode so readers never wait on a writer's transaction
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Database connection established");

        let catalog = Self {
            conn: Mutex::new(conn),
            readers: ReadPool::new(db_path),
        };

        catalog.create_schema()?;
        info!("Catalog initialized successfully");

        Ok(catalog)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), CatalogError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS namespaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT,
                trusted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS module_providers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                target TEXT NOT NULL,
                kind TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                owner TEXT,
                source_url TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (namespace_id) REFERENCES namespaces(id),
                UNIQUE(namespace_id, name, target)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS module_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module_provider_id INTEGER NOT NULL,
                version TEXT NOT NULL,
                status TEXT NOT NULL,
                artifact TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                description TEXT,
                owner TEXT,
                source_url TEXT,
                provider_logo TEXT,
                protocols TEXT NOT NULL DEFAULT '[]',
                shasum TEXT,
                FOREIGN KEY (module_provider_id) REFERENCES module_providers(id),
                UNIQUE(module_provider_id, version)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_module_provider_id ON module_versions(module_provider_id)",
            [],
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CatalogError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn timestamp_ms(at: DateTime<Utc>) -> i64 {
        at.timestamp_millis()
    }

    fn from_timestamp_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    fn read_version(row: &Row<'_>) -> rusqlite::Result<VersionRecord> {
        let status: String = row.get(1)?;
        let protocols: String = row.get(8)?;
        Ok(VersionRecord {
            version: row.get(0)?,
            // Unknown status strings are treated as deleted so they never resolve
            status: status.parse().unwrap_or(VersionStatus::Deleted),
            artifact: ArtifactRef::new(row.get::<_, String>(2)?),
            published_at: Self::from_timestamp_ms(row.get(3)?),
            description: row.get(4)?,
            owner: row.get(5)?,
            source_url: row.get(6)?,
            provider_logo: row.get(7)?,
            protocols: serde_json::from_str(&protocols).unwrap_or_default(),
            shasum: row.get(9)?,
            signing: row
                .get::<_, Option<String>>(10)?
                .and_then(|json| serde_json::from_str(&json).ok()),
        })
    }

    fn module_provider_id(
        tx: &Transaction<'_>,
        id: &ModuleId,
    ) -> Result<Option<(i64, String)>, CatalogError> {
        let row = tx
            .query_row(
                r#"
                SELECT mp.id, mp.kind FROM module_providers mp
                JOIN namespaces n ON mp.namespace_id = n.id
                WHERE n.name = ?1 AND mp.name = ?2 AND mp.target = ?3
                "#,
                (&id.namespace, &id.name, &id.target),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn is_unique_violation(error: &rusqlite::Error) -> bool {
        matches!(
            error,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

impl CatalogRepository for SqliteCatalog {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, CatalogError> {
        self.readers.with_conn(|conn| {
            let namespace = conn
                .query_row(
                    "SELECT name, display_name, trusted FROM namespaces WHERE name = ?1",
                    [name],
                    |row| {
                        Ok(Namespace {
                            name: row.get(0)?,
                            display_name: row.get(1)?,
                            trusted: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(namespace)
        })
    }

    fn create_namespace(
        &self,
        name: &str,
        display_name: Option<String>,
    ) -> Result<Namespace, CatalogError> {
        let now = Self::timestamp_ms(Utc::now());
        let conn = self.lock_conn()?;

        match conn.execute(
            "INSERT INTO namespaces (name, display_name, created_at) VALUES (?1, ?2, ?3)",
            (name, &display_name, now),
        ) {
            Ok(_) => {}
            Err(e) if Self::is_unique_violation(&e) => {
                return Err(CatalogError::DuplicateNamespace(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Created namespace {}", name);
        Ok(Namespace {
            name: name.to_string(),
            display_name,
            trusted: false,
        })
    }

    fn set_namespace_trusted(&self, name: &str, trusted: bool) -> Result<(), CatalogError> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE namespaces SET trusted = ?1 WHERE name = ?2",
            (trusted, name),
        )?;
        if updated == 0 {
            return Err(CatalogError::NamespaceNotFound(name.to_string()));
        }
        Ok(())
    }

    fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleMetadata>, CatalogError> {
        self.readers.with_conn(|conn| {
            let module = conn
                .query_row(
                    r#"
                    SELECT mp.kind, mp.verified, mp.description, mp.owner, mp.source_url,
                           mp.created_at
                    FROM module_providers mp
                    JOIN namespaces n ON mp.namespace_id = n.id
                    WHERE n.name = ?1 AND mp.name = ?2 AND mp.target = ?3
                    "#,
                    (&id.namespace, &id.name, &id.target),
                    |row| {
                        let kind: String = row.get(0)?;
                        Ok(ModuleMetadata {
                            id: id.clone(),
                            kind: kind.parse().unwrap_or_default(),
                            verified: row.get(1)?,
                            description: row.get(2)?,
                            owner: row.get(3)?,
                            source_url: row.get(4)?,
                            created_at: Self::from_timestamp_ms(row.get(5)?),
                        })
                    },
                )
                .optional()?;
            Ok(module)
        })
    }

    fn set_module_verified(&self, id: &ModuleId, verified: bool) -> Result<(), CatalogError> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE module_providers SET verified = ?1
            WHERE name = ?3 AND target = ?4
              AND namespace_id = (SELECT id FROM namespaces WHERE name = ?2)
            "#,
            (verified, &id.namespace, &id.name, &id.target),
        )?;
        if updated == 0 {
            return Err(CatalogError::ModuleNotFound(id.clone()));
        }
        Ok(())
    }

    fn list_targets(
        &self,
        namespace: &str,
        name: &str,
        kind: ModuleKind,
    ) -> Result<Vec<String>, CatalogError> {
        self.readers.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                r#"
                SELECT mp.target FROM module_providers mp
                JOIN namespaces n ON mp.namespace_id = n.id
                WHERE n.name = ?1 AND mp.name = ?2 AND mp.kind = ?3
                ORDER BY mp.target
                "#,
            )?;

            let targets = stmt
                .query_map((namespace, name, kind.as_str()), |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;

            Ok(targets)
        })
    }

    fn list_version_records(&self, id: &ModuleId) -> Result<Vec<VersionRecord>, CatalogError> {
        self.readers.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                r#"
                SELECT {VERSION_COLUMNS} FROM module_versions v
                JOIN module_providers mp ON v.module_provider_id = mp.id
                JOIN namespaces n ON mp.namespace_id = n.id
                WHERE n.name = ?1 AND mp.name = ?2 AND mp.target = ?3
                  AND v.status != 'deleted'
                ORDER BY v.id
                "#
            ))?;

            let records = stmt
                .query_map((&id.namespace, &id.name, &id.target), Self::read_version)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
    }

    fn get_version_record(
        &self,
        id: &ModuleId,
        version: &str,
    ) -> Result<Option<VersionRecord>, CatalogError> {
        self.readers.with_conn(|conn| {
            let record = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT {VERSION_COLUMNS} FROM module_versions v
                        JOIN module_providers mp ON v.module_provider_id = mp.id
                        JOIN namespaces n ON mp.namespace_id = n.id
                        WHERE n.name = ?1 AND mp.name = ?2 AND mp.target = ?3
                          AND v.precedence_key = ?4 AND v.status != 'deleted'
                        "#
                    ),
                    (&id.namespace, &id.name, &id.target, precedence_key(version)),
                    Self::read_version,
                )
                .optional()?;
            Ok(record)
        })
    }

    fn insert_version(
        &self,
        request: &PublishRequest,
        published_at: DateTime<Utc>,
    ) -> Result<VersionRecord, CatalogError> {
        let id = &request.id;
        let metadata = &request.metadata;
        let now = Self::timestamp_ms(published_at);
        let status = if metadata.beta {
            VersionStatus::Beta
        } else {
            VersionStatus::Published
        };

        debug!("Publishing {} version {}", id, request.version);

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO namespaces (name, created_at) VALUES (?1, ?2)
            ON CONFLICT(name) DO NOTHING
            "#,
            (&id.namespace, now),
        )?;

        tx.execute(
            r#"
            INSERT INTO module_providers
                (namespace_id, name, target, kind, description, owner, source_url, created_at)
            VALUES ((SELECT id FROM namespaces WHERE name = ?1), ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(namespace_id, name, target) DO UPDATE SET
                description = COALESCE(excluded.description, description),
                owner = COALESCE(excluded.owner, owner),
                source_url = COALESCE(excluded.source_url, source_url)
            "#,
            (
                &id.namespace,
                &id.name,
                &id.target,
                metadata.kind.as_str(),
                &metadata.description,
                &metadata.owner,
                &metadata.source_url,
                now,
            ),
        )?;

        let Some((module_provider_id, kind)) = Self::module_provider_id(&tx, id)? else {
            return Err(CatalogError::ModuleNotFound(id.clone()));
        };

        if kind != metadata.kind.as_str() {
            // Dropping the transaction rolls back the namespace/module upserts
            return Err(CatalogError::InvalidMetadata(format!(
                "{} is registered as a {}, not a {}",
                id,
                kind,
                metadata.kind.as_str()
            )));
        }

        let protocols = serde_json::to_string(&metadata.protocols)
            .map_err(|e| CatalogError::InvalidMetadata(e.to_string()))?;
        let signing = metadata
            .signing
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CatalogError::InvalidMetadata(e.to_string()))?;

        let inserted = tx.execute(
            r#"
            INSERT INTO module_versions
                (module_provider_id, version, precedence_key, status, artifact, published_at,
                 description, owner, source_url, provider_logo, protocols, shasum, signing)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            (
                module_provider_id,
                &request.version,
                precedence_key(&request.version),
                status.as_str(),
                metadata.artifact.as_str(),
                now,
                &metadata.description,
                &metadata.owner,
                &metadata.source_url,
                &metadata.provider_logo,
                &protocols,
                &metadata.shasum,
                &signing,
            ),
        );

        match inserted {
            Ok(_) => {}
            Err(e) if Self::is_unique_violation(&e) => {
                return Err(CatalogError::DuplicateVersion {
                    module: id.clone(),
                    version: request.version.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit()?;

        info!("Published {} version {} ({})", id, request.version, status);

        Ok(VersionRecord {
            version: request.version.clone(),
            status,
            artifact: metadata.artifact.clone(),
            published_at: Self::from_timestamp_ms(now),
            description: metadata.description.clone(),
            owner: metadata.owner.clone(),
            source_url: metadata.source_url.clone(),
            provider_logo: metadata.provider_logo.clone(),
            protocols: metadata.protocols.clone(),
            shasum: metadata.shasum.clone(),
            signing: metadata.signing.clone(),
        })
    }

    fn set_version_status(
        &self,
        id: &ModuleId,
        version: &str,
        status: VersionStatus,
    ) -> Result<(), CatalogError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let Some((module_provider_id, _)) = Self::module_provider_id(&tx, id)? else {
            return Err(CatalogError::ModuleNotFound(id.clone()));
        };

        let row: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, status FROM module_versions
                 WHERE module_provider_id = ?1 AND precedence_key = ?2",
                (module_provider_id, precedence_key(version)),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let parsed = row.and_then(|(row_id, s)| Some((row_id, s.parse::<VersionStatus>().ok()?)));
        let (row_id, current) = match parsed {
            Some((_, VersionStatus::Deleted)) | None => {
                return Err(CatalogError::VersionNotFound {
                    module: id.clone(),
                    version: version.to_string(),
                });
            }
            Some(found) => found,
        };

        if !current.can_transition_to(status) {
            return Err(CatalogError::InvalidStatusTransition {
                module: id.clone(),
                version: version.to_string(),
                from: current,
                to: status,
            });
        }

        tx.execute(
            "UPDATE module_versions SET status = ?1 WHERE id = ?2",
            (status.as_str(), row_id),
        )?;
        tx.commit()?;

        info!("{} version {}: {} -> {}", id, version, current, status);
        Ok(())
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let (namespaces, modules, module_versions): (i64, i64, i64) =
            self.readers.with_conn(|conn| {
                conn.query_row(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM namespaces),
                        (SELECT COUNT(*) FROM module_providers),
                        (SELECT COUNT(*) FROM module_versions WHERE status = 'published')
                    "#,
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
            })?;

        Ok(CatalogStats {
            namespaces: namespaces as u64,
            modules: modules as u64,
            module_versions: module_versions as u64,
        })
    }

    fn most_recently_published(
        &self,
        kind: ModuleKind,
    ) -> Result<Option<(ModuleId, VersionRecord)>, CatalogError> {
        self.readers.with_conn(|conn| {
            let latest = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT {VERSION_COLUMNS}, n.name, mp.name, mp.target
                        FROM module_versions v
                        JOIN module_providers mp ON v.module_provider_id = mp.id
                        JOIN namespaces n ON mp.namespace_id = n.id
                        WHERE v.status = 'published' AND mp.kind = ?1
                        ORDER BY v.published_at DESC, v.id DESC
                        LIMIT 1
                        "#
                    ),
                    [kind.as_str()],
                    |row| {
                        let id = ModuleId::new(
                            row.get::<_, String>(11)?,
                            row.get::<_, String>(12)?,
                            row.get::<_, String>(13)?,
                        );
                        Ok((id, Self::read_version(row)?))
                    },
                )
                .optional()?;
            Ok(latest)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{GpgPublicKey, ProviderSigning, VersionMetadata};
    use rstest::rstest;
    use tempfile::TempDir;

    fn create_catalog() -> (TempDir, SqliteCatalog) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        let catalog = SqliteCatalog::new(&db_path).unwrap();
        (temp_dir, catalog)
    }

    fn publish(catalog: &SqliteCatalog, id: &ModuleId, version: &str) -> VersionRecord {
        let request = PublishRequest::new(
            id.clone(),
            version,
            VersionMetadata::new(format!("{}/{}.zip", id, version)),
        );
        catalog.insert_version(&request, Utc::now()).unwrap()
    }

    #[test]
    fn insert_version_creates_namespace_and_module() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");

        publish(&catalog, &id, "1.0.0");

        let namespace = catalog.get_namespace("acme").unwrap().unwrap();
        assert_eq!(namespace.name, "acme");
        assert!(!namespace.trusted);

        let module = catalog.get_module(&id).unwrap().unwrap();
        assert_eq!(module.kind, ModuleKind::Module);
        assert!(!module.verified);
    }

    #[test]
    fn insert_version_rejects_duplicate_and_keeps_one_record() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");

        let request = PublishRequest::new(id.clone(), "1.0.0", VersionMetadata::new("other.zip"));
        let result = catalog.insert_version(&request, Utc::now());

        assert!(matches!(
            result,
            Err(CatalogError::DuplicateVersion { .. })
        ));
        let records = catalog.list_version_records(&id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].artifact.as_str(), "acme/vpc/aws/1.0.0.zip");
    }

    #[rstest]
    #[case("1.0.0+a", "1.0.0+b")]
    #[case("1.0.0", "1.0.0+build.7")]
    #[case("1.0.0+build.7", "1.0.0")]
    fn versions_differing_only_in_build_metadata_are_duplicates(
        #[case] first: &str,
        #[case] second: &str,
    ) {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, first);

        let request = PublishRequest::new(id.clone(), second, VersionMetadata::new("other.zip"));

        assert!(matches!(
            catalog.insert_version(&request, Utc::now()),
            Err(CatalogError::DuplicateVersion { .. })
        ));
        let records = catalog.list_version_records(&id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, first);
    }

    #[test]
    fn provider_signing_is_stored_and_read_back() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "cloud", "linux_amd64");
        let signing = ProviderSigning {
            shasums_url: "https://example.com/SHA256SUMS".to_string(),
            shasums_signature_url: "https://example.com/SHA256SUMS.sig".to_string(),
            gpg_public_keys: vec![GpgPublicKey {
                key_id: "51852D87348FFC4C".to_string(),
                ascii_armor: "-----BEGIN PGP PUBLIC KEY BLOCK-----".to_string(),
                trust_signature: String::new(),
                source: "Acme".to_string(),
                source_url: None,
            }],
        };
        let metadata = VersionMetadata {
            kind: ModuleKind::Provider,
            protocols: vec!["5.0".to_string()],
            signing: Some(signing.clone()),
            ..VersionMetadata::new("cloud.zip")
        };
        catalog
            .insert_version(&PublishRequest::new(id.clone(), "1.0.0", metadata), Utc::now())
            .unwrap();

        let record = catalog.get_version_record(&id, "1.0.0").unwrap().unwrap();
        assert_eq!(record.signing, Some(signing));
    }

    #[test]
    fn exact_lookup_ignores_build_metadata() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0+a");

        let record = catalog.get_version_record(&id, "1.0.0").unwrap().unwrap();
        assert_eq!(record.version, "1.0.0+a");
        assert!(catalog.get_version_record(&id, "1.0.0+zzz").unwrap().is_some());

        catalog
            .set_version_status(&id, "1.0.0", VersionStatus::Deleted)
            .unwrap();
        assert!(catalog.get_version_record(&id, "1.0.0+a").unwrap().is_none());
    }

    #[test]
    fn reads_do_not_wait_for_an_open_write_transaction() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");

        let mut writer = catalog.lock_conn().unwrap();
        let tx = writer.transaction().unwrap();
        tx.execute(
            "UPDATE module_versions SET status = 'deleted' WHERE version = '1.0.0'",
            [],
        )
        .unwrap();

        // Same thread as the writer: these would deadlock on a shared connection
        assert_eq!(catalog.list_version_records(&id).unwrap().len(), 1);
        assert!(catalog.get_module(&id).unwrap().is_some());
        assert_eq!(catalog.stats().unwrap().module_versions, 1);

        tx.commit().unwrap();
        drop(writer);
        assert!(catalog.list_version_records(&id).unwrap().is_empty());
    }

    #[test]
    fn most_recently_published_skips_betas_and_other_kinds() {
        let (_dir, catalog) = create_catalog();
        let vpc = ModuleId::new("acme", "vpc", "aws");
        let dns = ModuleId::new("acme", "dns", "gcp");
        let start = Utc::now();

        assert!(catalog.most_recently_published(ModuleKind::Module).unwrap().is_none());

        let insert = |id: &ModuleId, version: &str, metadata: VersionMetadata, offset: i64| {
            catalog
                .insert_version(
                    &PublishRequest::new(id.clone(), version, metadata),
                    start + chrono::Duration::seconds(offset),
                )
                .unwrap();
        };
        insert(&vpc, "1.0.0", VersionMetadata::new("vpc.zip"), 0);
        insert(&dns, "0.3.0", VersionMetadata::new("dns.zip"), 10);
        let mut beta = VersionMetadata::new("vpc-beta.zip");
        beta.beta = true;
        insert(&vpc, "2.0.0-rc.1", beta, 20);
        let mut provider = VersionMetadata::new("provider.zip");
        provider.kind = ModuleKind::Provider;
        insert(&ModuleId::new("acme", "cloud", "linux_amd64"), "5.0.0", provider, 30);

        let (id, record) = catalog
            .most_recently_published(ModuleKind::Module)
            .unwrap()
            .unwrap();
        assert_eq!(id, dns);
        assert_eq!(record.version, "0.3.0");
    }

    #[test]
    fn insert_version_rejects_kind_mismatch_without_side_effects() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "aws", "linux_amd64");
        publish(&catalog, &id, "1.0.0");

        let mut metadata = VersionMetadata::new("provider.zip");
        metadata.kind = ModuleKind::Provider;
        let request = PublishRequest::new(id.clone(), "2.0.0", metadata);

        assert!(matches!(
            catalog.insert_version(&request, Utc::now()),
            Err(CatalogError::InvalidMetadata(_))
        ));
        assert_eq!(catalog.list_version_records(&id).unwrap().len(), 1);
    }

    #[test]
    fn list_version_records_returns_empty_for_unknown_module() {
        let (_dir, catalog) = create_catalog();
        let records = catalog
            .list_version_records(&ModuleId::new("nobody", "nothing", "aws"))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn insert_version_stores_beta_status() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        let mut metadata = VersionMetadata::new("beta.zip");
        metadata.beta = true;

        let record = catalog
            .insert_version(&PublishRequest::new(id.clone(), "2.0.0", metadata), Utc::now())
            .unwrap();

        assert_eq!(record.status, VersionStatus::Beta);
        assert_eq!(
            catalog.get_version_record(&id, "2.0.0").unwrap().unwrap().status,
            VersionStatus::Beta
        );
    }

    #[rstest]
    #[case(VersionStatus::Published, false)]
    #[case(VersionStatus::Deleted, true)]
    #[case(VersionStatus::Beta, false)]
    fn set_version_status_from_published(#[case] next: VersionStatus, #[case] allowed: bool) {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");

        let result = catalog.set_version_status(&id, "1.0.0", next);

        assert_eq!(result.is_ok(), allowed, "{:?}", result);
    }

    #[test]
    fn deleted_versions_are_hidden_but_still_reserved() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");
        catalog
            .set_version_status(&id, "1.0.0", VersionStatus::Deleted)
            .unwrap();

        assert!(catalog.get_version_record(&id, "1.0.0").unwrap().is_none());
        assert!(catalog.list_version_records(&id).unwrap().is_empty());

        let request = PublishRequest::new(id.clone(), "1.0.0", VersionMetadata::new("again.zip"));
        assert!(matches!(
            catalog.insert_version(&request, Utc::now()),
            Err(CatalogError::DuplicateVersion { .. })
        ));
    }

    #[test]
    fn set_module_verified_and_namespace_trusted() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");

        catalog.set_module_verified(&id, true).unwrap();
        catalog.set_namespace_trusted("acme", true).unwrap();

        assert!(catalog.get_module(&id).unwrap().unwrap().verified);
        assert!(catalog.get_namespace("acme").unwrap().unwrap().trusted);
        assert!(matches!(
            catalog.set_namespace_trusted("missing", true),
            Err(CatalogError::NamespaceNotFound(_))
        ));
        assert!(matches!(
            catalog.set_module_verified(&ModuleId::new("acme", "missing", "aws"), true),
            Err(CatalogError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn create_namespace_rejects_duplicates() {
        let (_dir, catalog) = create_catalog();
        catalog
            .create_namespace("acme", Some("Acme Corp".to_string()))
            .unwrap();

        assert!(matches!(
            catalog.create_namespace("acme", None),
            Err(CatalogError::DuplicateNamespace(_))
        ));
        assert_eq!(
            catalog.get_namespace("acme").unwrap().unwrap().display_name,
            Some("Acme Corp".to_string())
        );
    }

    #[test]
    fn list_targets_filters_by_kind() {
        let (_dir, catalog) = create_catalog();
        for target in ["linux_amd64", "darwin_arm64"] {
            let mut metadata = VersionMetadata::new("p.zip");
            metadata.kind = ModuleKind::Provider;
            let request =
                PublishRequest::new(ModuleId::new("acme", "cloud", target), "1.0.0", metadata);
            catalog.insert_version(&request, Utc::now()).unwrap();
        }
        publish(&catalog, &ModuleId::new("acme", "cloud", "aws"), "1.0.0");

        assert_eq!(
            catalog
                .list_targets("acme", "cloud", ModuleKind::Provider)
                .unwrap(),
            vec!["darwin_arm64".to_string(), "linux_amd64".to_string()]
        );
        assert_eq!(
            catalog
                .list_targets("acme", "cloud", ModuleKind::Module)
                .unwrap(),
            vec!["aws".to_string()]
        );
    }

    #[test]
    fn stats_counts_published_versions_only() {
        let (_dir, catalog) = create_catalog();
        let id = ModuleId::new("acme", "vpc", "aws");
        publish(&catalog, &id, "1.0.0");
        publish(&catalog, &id, "1.1.0");
        publish(&catalog, &ModuleId::new("other", "dns", "gcp"), "0.1.0");
        catalog
            .set_version_status(&id, "1.1.0", VersionStatus::Deleted)
            .unwrap();

        assert_eq!(
            catalog.stats().unwrap(),
            CatalogStats {
                namespaces: 2,
                modules: 2,
                module_versions: 2,
            }
        );
    }

    #[test]
    fn reopening_database_keeps_data_and_schema_version() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        let id = ModuleId::new("acme", "vpc", "aws");
        {
            let catalog = SqliteCatalog::new(&db_path).unwrap();
            publish(&catalog, &id, "1.0.0");
        }

        let catalog = SqliteCatalog::new(&db_path).unwrap();
        assert_eq!(catalog.list_version_records(&id).unwrap().len(), 1);

        let conn = catalog.lock_conn().unwrap();
        let user_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(user_version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn upgrading_from_v1_backfills_precedence_keys() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        let id = ModuleId::new("acme", "vpc", "aws");
        {
            let catalog = SqliteCatalog::new(&db_path).unwrap();
            publish(&catalog, &id, "1.0.0+legacy");
            let conn = catalog.lock_conn().unwrap();
            conn.execute("DROP INDEX idx_module_versions_precedence", [])
                .unwrap();
            conn.execute("ALTER TABLE module_versions DROP COLUMN precedence_key", [])
                .unwrap();
            conn.execute("ALTER TABLE module_versions DROP COLUMN signing", [])
                .unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
        }

        let catalog = SqliteCatalog::new(&db_path).unwrap();

        let record = catalog.get_version_record(&id, "1.0.0").unwrap().unwrap();
        assert_eq!(record.version, "1.0.0+legacy");
        let request = PublishRequest::new(id.clone(), "1.0.0+new", VersionMetadata::new("n.zip"));
        assert!(matches!(
            catalog.insert_version(&request, Utc::now()),
            Err(CatalogError::DuplicateVersion { .. })
        ));
    }
}
