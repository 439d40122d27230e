//! 클라이언트 레지스트리 서비스
//!
//! 연결된 클라이언트를 연결 식별자로 관리하는 스레드 안전 저장소입니다.
//! 보조 별칭 인덱스를 함께 유지하며, 모든 연산은 키 단위로 원자적이고
//! 전역 락을 요구하지 않습니다.
//!
//! 연결/해제 경쟁 아래에서 리스너(연결), 트랜시버 해제 콜백(해제),
//! 디스패처(조회)가 동시에 접근합니다. 모든 연산은 예외를 던지지 않고
//! bool/Option을 반환합니다.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::transceiver::Transceiver;

/// 연결된 클라이언트
///
/// 수락 시점에 부여되어 재사용되지 않는 128비트 연결 식별자,
/// 핸들러가 한 번 설정할 수 있는 별칭, 트랜시버 핸들로 구성됩니다.
#[derive(Clone)]
pub struct Client {
    /// 연결 식별자
    pub id: Uuid,
    /// 사용자가 선택한 별칭 (프로세스 범위에서 유일)
    pub alias: Option<String>,
    /// 이 클라이언트의 트랜시버 핸들
    pub transceiver: Arc<dyn Transceiver>,
}

impl Client {
    /// 별칭 없는 클라이언트 생성
    pub fn new(id: Uuid, transceiver: Arc<dyn Transceiver>) -> Self {
        Self {
            id,
            alias: None,
            transceiver,
        }
    }
}

/// 클라이언트 레지스트리
///
/// 식별자 → 클라이언트 본 저장소와 별칭 → 식별자 보조 인덱스를
/// `DashMap` 두 개로 유지합니다. 교착을 피하기 위해 두 맵의 락을
/// 동시에 잡지 않습니다.
#[derive(Default)]
pub struct ClientService {
    clients: DashMap<Uuid, Client>,
    aliases: DashMap<String, Uuid>,
}

impl ClientService {
    /// 새로운 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 클라이언트 존재 여부 확인
    pub fn client_exists(&self, id: Uuid) -> bool {
        self.clients.contains_key(&id)
    }

    /// 별칭 사용 여부 확인
    pub fn alias_exists(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// 현재 연결 수
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// 클라이언트를 추가합니다.
    ///
    /// 같은 식별자가 이미 있으면 덮어쓰지 않고 `false`를 반환합니다.
    pub fn add(&self, client: Client) -> bool {
        let id = client.id;
        let alias = client.alias.clone();

        match self.clients.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => return false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(client);
            }
        }

        if let Some(alias) = alias {
            self.aliases.insert(alias, id);
        }
        true
    }

    /// 클라이언트를 제거합니다.
    ///
    /// 없으면 `false`, 성공 시 해당 식별자를 가리키는 별칭 인덱스
    /// 항목도 함께 제거합니다.
    pub fn remove(&self, id: Uuid) -> bool {
        let Some((_, client)) = self.clients.remove(&id) else {
            return false;
        };

        if let Some(alias) = client.alias {
            // 그 사이 다른 클라이언트가 같은 별칭을 가져갔을 수 있으므로
            // 식별자가 일치할 때만 인덱스를 지웁니다.
            self.aliases.remove_if(&alias, |_, owner| *owner == id);
        }
        true
    }

    /// 식별자로 클라이언트를 조회합니다.
    pub fn get_by_id(&self, id: Uuid) -> Option<Client> {
        self.clients.get(&id).map(|entry| entry.clone())
    }

    /// 별칭으로 클라이언트를 조회합니다.
    pub fn get_by_alias(&self, alias: &str) -> Option<Client> {
        let id = *self.aliases.get(alias)?;
        self.get_by_id(id)
    }

    /// 클라이언트의 별칭을 설정합니다.
    ///
    /// 클라이언트가 없으면 `false`를 반환합니다. 이전 별칭이 있으면
    /// 인덱스에서 지워 고아 항목을 남기지 않습니다.
    ///
    /// 주의: 별칭의 클라이언트 간 유일성은 이 메서드가 보장하지
    /// 않습니다. 호출자가 [`alias_exists`](Self::alias_exists)를 먼저
    /// 확인하는 것이 문서화된 전제조건이며, 원자적 보장이 필요하면
    /// [`try_claim_alias`](Self::try_claim_alias)를 사용하십시오.
    pub fn set_alias(&self, id: Uuid, alias: &str) -> bool {
        let old_alias = {
            let Some(mut client) = self.clients.get_mut(&id) else {
                return false;
            };
            client.alias.replace(alias.to_string())
        };

        if let Some(old) = old_alias {
            self.aliases.remove_if(&old, |_, owner| *owner == id);
        }
        self.aliases.insert(alias.to_string(), id);
        debug!("클라이언트 '{}' 별칭 설정: {}", id, alias);
        true
    }

    /// 별칭을 원자적으로 선점합니다 (compare-and-set).
    ///
    /// 별칭이 이미 다른 클라이언트에 배정되어 있으면 `false`를
    /// 반환하고 아무것도 바꾸지 않습니다. 확인과 설정이 한 번의
    /// 인덱스 연산으로 이루어져 check-then-act 경쟁이 없습니다.
    pub fn try_claim_alias(&self, id: Uuid, alias: &str) -> bool {
        match self.aliases.entry(alias.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                // 자기 자신이 이미 가진 별칭이면 성공으로 간주
                *entry.get() == id
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(id);
                true
            }
        }
        .then(|| {
            let old_alias = {
                let Some(mut client) = self.clients.get_mut(&id) else {
                    // 선점 직후 연결이 끊긴 경우 인덱스를 되돌립니다.
                    self.aliases.remove_if(alias, |_, owner| *owner == id);
                    return false;
                };
                client.alias.replace(alias.to_string())
            };
            if let Some(old) = old_alias {
                if old != alias {
                    self.aliases.remove_if(&old, |_, owner| *owner == id);
                }
            }
            true
        })
        .unwrap_or(false)
    }

    /// 현재 배정된 별칭들의 스냅샷을 반환합니다.
    pub fn list_aliases(&self) -> Vec<String> {
        self.aliases.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 모든 클라이언트를 정리합니다.
    ///
    /// 등록된 모든 트랜시버를 중지한 뒤 두 맵을 비웁니다.
    /// 서버 종료 시에만 사용되는 일괄 해체 경로입니다.
    pub async fn clear_all(&self) {
        let clients: Vec<Client> = self.clients.iter().map(|entry| entry.clone()).collect();
        let count = clients.len();

        for client in clients {
            client.transceiver.stop().await;
        }
        self.clients.clear();
        self.aliases.clear();

        info!("모든 클라이언트 연결 해제: {}개", count);
    }
}
