//! Pool manager lifecycle tests

#[cfg(test)]
mod manager_tests {
    use std::sync::atomic::Ordering;

    use erpgate_core::{ConnectorKind, ErpError, Params};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use crate::fixtures::{Backend, params, scripted_manager};

    #[rstest]
    #[case("sap", ConnectorKind::Sap)]
    #[case("sap_rest", ConnectorKind::SapRest)]
    #[case("oracle", ConnectorKind::Oracle)]
    #[case("mssql", ConnectorKind::SqlServer)]
    #[case("DIA", ConnectorKind::Dia)]
    #[tokio::test]
    async fn test_pool_name_selects_kind(
        #[case] name: &str,
        #[case] expected: ConnectorKind,
    ) -> anyhow::Result<()> {
        let backend = Backend::new();
        let manager = scripted_manager(&backend);

        let pool = manager.create_pool(name, None, &Params::new(), 1).await?;
        assert_eq!(pool.kind(), expected);

        let conn = manager.get_connection(name).await?;
        assert_eq!(conn.kind(), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_lifecycle() -> anyhow::Result<()> {
        let backend = Backend::new();
        let manager = scripted_manager(&backend);

        manager
            .create_pool(
                "finance",
                Some(ConnectorKind::Oracle),
                &params(json!({"host": "ora01", "service_name": "FIN", "max_retries": 2})),
                2,
            )
            .await?;
        manager.create_pool("dia", None, &Params::new(), 3).await?;
        assert_eq!(backend.connects.load(Ordering::SeqCst), 5);

        let finance = manager.pool("finance").expect("finance pool");
        assert_eq!(finance.config().database.as_deref(), Some("FIN"));
        assert_eq!(finance.config().max_retries, 2);

        {
            let mut conn = manager.get_connection("finance").await?;
            conn.execute_with_retry("query", &Params::new()).await?;
            assert_eq!(manager.get_all_stats()["finance"].in_use, 1);
        }

        let stats = manager.get_all_stats();
        assert_eq!(stats["finance"].in_use, 0);
        assert_eq!(stats["finance"].available, 2);
        assert_eq!(stats["dia"].max_connections, 3);

        assert!(manager.close_pool("finance").await);
        assert!(matches!(
            manager.get_connection("finance").await.unwrap_err(),
            ErpError::PoolNotFound(_)
        ));

        manager.close_all().await;
        assert!(manager.get_all_stats().is_empty());
        assert_eq!(backend.disconnects.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolvable_name_needs_explicit_kind() -> anyhow::Result<()> {
        let backend = Backend::new();
        let manager = scripted_manager(&backend);

        let err = manager
            .create_pool("warehouse", None, &Params::new(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown connector type: warehouse");

        manager
            .create_pool("warehouse", Some(ConnectorKind::SqlServer), &Params::new(), 1)
            .await?;
        assert_eq!(manager.pool_names(), vec!["warehouse".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_connecting() -> anyhow::Result<()> {
        let backend = Backend::new();
        let manager = scripted_manager(&backend);

        let err = manager
            .create_pool("dia", None, &params(json!({"port": "not-a-port"})), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, ErpError::Configuration(_)));
        assert_eq!(backend.created.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
