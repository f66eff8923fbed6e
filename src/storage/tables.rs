use redb::TableDefinition;

/// Tables keyed by uuid holding msgpack blobs
pub type BlobTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// User records: uuid -> UserRecord (msgpack)
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Uniqueness index: username -> user uuid
pub const USERNAMES: TableDefinition<&str, &str> = TableDefinition::new("usernames");

/// Uniqueness index: normalized email -> user uuid
pub const EMAILS: TableDefinition<&str, &str> = TableDefinition::new("emails");

/// Artifact records: uuid -> ArtifactRecord (msgpack)
pub const ARTIFACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifacts");

/// Storage key index: object store key -> artifact uuid (for /uploads/ lookups and reconcile)
pub const ARTIFACT_KEYS: TableDefinition<&str, &str> = TableDefinition::new("artifact_keys");

/// Owner index: user uuid -> msgpack Vec of artifact UUIDs
pub const OWNER_ARTIFACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_artifacts");

/// Shape records: uuid -> ShapeRecord (msgpack)
pub const SHAPES: TableDefinition<&str, &[u8]> = TableDefinition::new("shapes");

/// Owner index: user uuid -> msgpack Vec of shape UUIDs
pub const OWNER_SHAPES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_shapes");

/// Marker records: uuid -> MarkerRecord (msgpack)
pub const MARKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("markers");

/// Owner index: user uuid -> msgpack Vec of marker UUIDs
pub const OWNER_MARKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_markers");
