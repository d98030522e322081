/*!

This is the long-form manual for `protocol_count` and `ctrlpkw`.

## Counting a ballot

Every polling ward sends one or more protocols for a ballot: observers in the field
each submit what they read on the official protocol posted at the ward. A ballot is tallied
in three steps:

1. the protocols are grouped by ward (community code and ward number). The order in which the
   protocols are stored does not matter.
2. one protocol is retained per ward. Protocols are never averaged or added together
   within a ward. The retained protocol is, in order:
   - a verified protocol over an unverified one;
   - the protocol with the most approvals minus deprecations (`approvalsFirst`, the default)
     or the most recently updated protocol (`latestFirst`);
   - then the other of these two criteria;
   - then the protocol with the lowest id.
3. the retained results are added up, option by option. All the protocols of a ballot must
   list the same number of options, otherwise the count fails.

## Verification

Reviewers approve or deprecate protocols. Both lists only grow: approving twice does nothing,
and the same reviewer may appear in both lists. Decisions never set the `verified` flag, which
is reserved to administrators.

Every write checks the `revision` of the record it read. With the `json` store, `ctrlpkw`
re-reads the file under an exclusive lock (`<protocolsPath>.lock`) before saving and only
writes back the protocols it created or changed. If another process saved one of them in the
meantime, the save fails with a conflict and nothing is written; `verify` then reloads and
tries again. The file is replaced atomically, so readers never see a partial store. A store
listing the same protocol id twice is rejected.

`ctrlpkw show --id` prints one stored protocol. `ctrlpkw submit --authorize-picture` also
reserves the first picture of the new protocol and prints its upload token.

## Nearest wards

Given a point, a radius (meters) and a minimum count, all the wards within the radius are
returned. If there are fewer than the minimum count, the closest wards are returned instead,
including every ward located at the same distance as the last one. Several wards often share
the same building: asking for one ward at such an address returns all of them.

## Input formats

### Protocols (`json`)

The protocol store is a JSON array of protocols:

```text
[
  {
    "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
    "clientId": "phone-42",
    "votingDate": "2015-05-10",
    "ballotNo": 1,
    "communityCode": "146501",
    "wardNo": 12,
    "ballotResult": {
      "votersEntitledCount": 1200,
      "ballotsGivenCount": 800,
      "votesCastCount": 798,
      "votesValidCount": 790,
      "votesCountPerOption": [400, 390]
    },
    "comment": null,
    "verified": false,
    "approvals": ["alice"],
    "deprecations": [],
    "imageIds": [],
    "creationTime": "2015-05-10T21:00:00Z",
    "updateTime": "2015-05-10T21:00:00Z",
    "revision": 0
  }
]
```

A submission (`ctrlpkw submit --input`) uses the same layout without the server-side fields
(`id`, `verified`, `approvals`, `deprecations`, `imageIds`, times and `revision`).

### Wards (`csv`, `xlsx`, `json`)

`csv` and `xlsx`: one ward per row after a header row:

```text
community_code,no,latitude,longitude
146502,101,52.2159212,20.9678
146502,102,52.2159212,20.9678
146510,9,,
```

Empty coordinates mean that the location of the ward is unknown. Such wards are never
returned by the nearest ward search. For `xlsx`, the first worksheet is read unless
`excelWorksheetName` is set.

`json`: an array of `{"communityCode": .., "no": .., "latitude": .., "longitude": ..}`.

## Configuration

`ctrlpkw` reads a JSON configuration file. Paths are relative to the directory of the
configuration file. Only `storage` is mandatory.

```text
{
  "storage": {
    "protocolsPath": "protocols.json",
    "wardsPath": "wards.csv",
    "wardsProvider": "csv",
    "excelWorksheetName": null
  },
  "rules": { "selectionMode": "approvalsFirst" },
  "geo": { "radius": 1000.0, "minCount": 1 },
  "verification": { "maxAttempts": 3 },
  "images": {
    "cloudName": "demo",
    "apiKey": "key",
    "apiSecret": "secret",
    "baseUrl": "http://res.cloudinary.com"
  }
}
```

Options given on the command line take precedence over the configuration file.

 */
