use derive_more::Constructor;

use crate::frame::message_response::ResponseBody;
use crate::frame::{Envelope, Version};
use crate::protocol_error::{Error, Result};
use crate::transport::CdrsTransport;

const LOCAL_INFO_QUERY: &str = "SELECT data_center, rack FROM system.local";

/// Location of a node, as reported by the node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Constructor)]
pub struct NodeInfo {
    pub datacenter: Option<String>,
    pub rack: Option<String>,
}

impl NodeInfo {
    /// Asks a node for its datacenter and rack over an established connection.
    pub async fn fetch<T: CdrsTransport + ?Sized>(
        transport: &T,
        version: Version,
    ) -> Result<NodeInfo> {
        let response = transport
            .write_envelope(&Envelope::new_req_query(LOCAL_INFO_QUERY, version))
            .await?;

        let rows = match response.response_body()? {
            ResponseBody::Result(result) => result.into_rows(),
            _ => None,
        }
        .ok_or_else(|| {
            Error::General(format!(
                "Unexpected response to local node info query: {}",
                response.opcode
            ))
        })?;

        if rows.rows.is_empty() {
            return Ok(NodeInfo::default());
        }

        Ok(NodeInfo::new(
            rows.text(0, "data_center")?,
            rows.text(0, "rack")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::message_result::{
        BodyResResultRows, ColType, ColumnSpec, ResResultBody,
    };
    use crate::frame::{Direction, Flags, Opcode, Serialize};
    use crate::transport::MockCdrsTransport;
    use crate::types::CBytes;
    use futures::FutureExt;

    fn transport_responding(opcode: Opcode, body: Vec<u8>) -> MockCdrsTransport {
        let mut transport = MockCdrsTransport::new();
        transport
            .expect_write_envelope()
            .withf(|envelope| envelope.opcode == Opcode::Query)
            .times(1)
            .returning(move |_| {
                let envelope = Envelope::new(
                    Version::V4,
                    Direction::Response,
                    Flags::empty(),
                    opcode,
                    0,
                    body.clone(),
                );
                async move { Ok(envelope) }.boxed()
            });
        transport
    }

    fn rows(rows: Vec<Vec<CBytes>>) -> Vec<u8> {
        ResResultBody::Rows(BodyResResultRows {
            keyspace: "system".into(),
            table: "local".into(),
            columns: vec![
                ColumnSpec {
                    name: "data_center".into(),
                    col_type: ColType::Varchar,
                },
                ColumnSpec {
                    name: "rack".into(),
                    col_type: ColType::Varchar,
                },
            ],
            rows,
        })
        .serialize_to_vec()
    }

    #[tokio::test]
    async fn should_read_datacenter_and_rack() {
        let transport = transport_responding(
            Opcode::Result,
            rows(vec![vec![
                CBytes::new(b"dc1".to_vec()),
                CBytes::new(b"rack1".to_vec()),
            ]]),
        );

        let info = NodeInfo::fetch(&transport, Version::V4).await.unwrap();
        assert_eq!(info, NodeInfo::new(Some("dc1".into()), Some("rack1".into())));
    }

    #[tokio::test]
    async fn should_accept_missing_rows() {
        let transport = transport_responding(Opcode::Result, rows(vec![]));

        let info = NodeInfo::fetch(&transport, Version::V4).await.unwrap();
        assert_eq!(info, NodeInfo::default());
    }

    #[tokio::test]
    async fn should_reject_non_rows_result() {
        let transport =
            transport_responding(Opcode::Result, ResResultBody::Void.serialize_to_vec());

        assert!(NodeInfo::fetch(&transport, Version::V4).await.is_err());
    }
}
