//! Element names used by the standard domains

// Request payloads
pub const VIEW_TYPE: &str = ":ViewType";
pub const VIEW_DATA: &str = ":ViewData";
pub const ITEM_LIST: &str = ":ItemList";

// Login
pub const APPLICATION_ID: &str = "ApplicationId";
pub const APPLICATION_NAME: &str = "ApplicationName";
pub const POSITION: &str = "Position";
pub const PASSWORD: &str = "Password";
pub const SINGLE_OPEN: &str = "SingleOpen";
pub const ALLOW_SUSPECT_DATA: &str = "AllowSuspectData";
pub const PROVIDE_PERMISSION_PROFILE: &str = "ProvidePermissionProfile";
pub const SUPPORT_BATCH_REQUESTS: &str = "SupportBatchRequests";
pub const SUPPORT_VIEW_REQUESTS: &str = "SupportViewRequests";
pub const SUPPORT_OMM_POST: &str = "SupportOMMPost";
pub const ROUND_TRIP_LATENCY: &str = "RoundTripLatency";
pub const TICKS: &str = "Ticks";
pub const TCP_RETRANS: &str = "TcpRetrans";

// Directory
pub const NAME: &str = "Name";
pub const VENDOR: &str = "Vendor";
pub const IS_SOURCE: &str = "IsSource";
pub const CAPABILITIES: &str = "Capabilities";
pub const DICTIONARIES_PROVIDED: &str = "DictionariesProvided";
pub const DICTIONARIES_USED: &str = "DictionariesUsed";
pub const QOS: &str = "QoS";
pub const SERVICE_STATE: &str = "ServiceState";
pub const ACCEPTING_REQUESTS: &str = "AcceptingRequests";
pub const STATUS: &str = "Status";
pub const GROUP: &str = "Group";
pub const MERGED_TO_GROUP: &str = "MergedToGroup";

// Dictionary
pub const DICT_TYPE: &str = "Type";
pub const DICT_VERSION: &str = "Version";
pub const DICTIONARY_ID: &str = "DictionaryId";
